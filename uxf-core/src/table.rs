use crate::error::TableError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One row of a [`DataTable`]: column name → stringified value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    cells: Vec<(String, String)>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a cell.
    pub fn add(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = DataRow::new();
        for (k, v) in iter {
            row.add(k, v);
        }
        row
    }
}

/// Header-ordered table. Columns are fixed at construction; every row
/// must supply exactly those columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    headers: Vec<String>,
    rows: Vec<DataRow>,
}

impl DataTable {
    pub fn new<I, S>(headers: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_capacity(headers, 0)
    }

    pub fn with_capacity<I, S>(headers: I, rows: usize) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(headers.len());
        for h in &headers {
            if !seen.insert(h.as_str()) {
                return Err(TableError::DuplicateColumn(h.clone()));
            }
        }
        Ok(Self {
            headers,
            rows: Vec::with_capacity(rows),
        })
    }

    /// Appends a row that covers every header and nothing else.
    pub fn add_complete_row(&mut self, row: DataRow) -> Result<(), TableError> {
        if let Some(extra) = row.columns().find(|c| !self.headers.iter().any(|h| h == c)) {
            return Err(TableError::UnknownColumn(extra.to_string()));
        }
        if let Some(missing) = self.headers.iter().find(|h| row.get(h).is_none()) {
            return Err(TableError::MissingColumn(missing.clone()));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column)
    }

    /// Values of one column, in row order.
    pub fn column(&self, column: &str) -> Option<Vec<&str>> {
        if !self.headers.iter().any(|h| h == column) {
            return None;
        }
        Some(self.rows.iter().filter_map(|r| r.get(column)).collect())
    }

    /// Header line followed by one comma-joined line per row.
    pub fn to_csv_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(self.headers.join(","));
        for row in &self.rows {
            let line = self
                .headers
                .iter()
                .map(|h| row.get(h).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(",");
            lines.push(line);
        }
        lines
    }

    pub fn to_csv(&self) -> String {
        let mut out = self.to_csv_lines().join("\n");
        out.push('\n');
        out
    }
}
