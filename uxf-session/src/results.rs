use crate::trial::Trial;
use std::collections::HashSet;
use uxf_core::{DataRow, DataTable, TableError, format_cell};

/// Builds the `trial_results` table.
///
/// Columns are the union of result keys over every trial that has a
/// result map, in first-seen order (trial order, then key order within a
/// trial). Each such trial contributes one row; keys it lacks, or holds
/// as null, become empty cells. Trials without a result map are skipped.
pub fn aggregate_results<'a, I>(trials: I) -> Result<DataTable, TableError>
where
    I: IntoIterator<Item = &'a Trial>,
    I::IntoIter: Clone,
{
    let trials = trials.into_iter();

    let mut seen = HashSet::new();
    let mut headers: Vec<&str> = Vec::new();
    let mut rows = 0;
    for result in trials.clone().filter_map(Trial::result) {
        rows += 1;
        for key in result.keys() {
            if seen.insert(key.as_str()) {
                headers.push(key.as_str());
            }
        }
    }

    let mut table = DataTable::with_capacity(headers.iter().copied(), rows)?;
    for result in trials.filter_map(Trial::result) {
        let row: DataRow = headers
            .iter()
            .map(|&h| (h, result.get(h).map(format_cell).unwrap_or_default()))
            .collect();
        table.add_complete_row(row)?;
    }
    Ok(table)
}
