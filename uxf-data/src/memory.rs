use crate::error::HandlerError;
use crate::handler::{DataHandler, DataTarget, SessionInfo};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uxf_core::{DataTable, DataType};

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Table(DataTable),
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedRecord {
    pub experiment_name: String,
    pub ppid: String,
    pub session_number: u32,
    pub data_name: String,
    pub data_type: DataType,
    pub payload: Payload,
}

#[derive(Debug, Default)]
pub struct MemoryLog {
    pub initialised: Vec<SessionInfo>,
    pub set_up_calls: usize,
    pub clean_up_calls: usize,
    /// `"<handler>: <call>"` for each lifecycle call, in arrival order.
    pub lifecycle: Vec<String>,
    pub records: Vec<SavedRecord>,
}

/// Shared view onto everything a [`MemoryHandler`] received.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<MemoryLog>>);

impl MemoryStore {
    pub fn lock(&self) -> MutexGuard<'_, MemoryLog> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records_named(&self, data_name: &str) -> Vec<SavedRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.data_name == data_name)
            .cloned()
            .collect()
    }

    pub fn table(&self, data_name: &str) -> Option<DataTable> {
        self.records_named(data_name)
            .into_iter()
            .rev()
            .find_map(|r| match r.payload {
                Payload::Table(t) => Some(t),
                _ => None,
            })
    }
}

/// Keeps every payload in memory. Useful for dry runs and for asserting
/// what a session exported.
#[derive(Debug, Default)]
pub struct MemoryHandler {
    name: String,
    store: MemoryStore,
    reject_saves: bool,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Writes into `store` instead of a private one, so several handlers
    /// can share a log.
    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.store = store;
        self
    }

    /// A handler whose every save fails, without storing anything.
    pub fn rejecting() -> Self {
        Self {
            name: "rejecting_memory".to_string(),
            reject_saves: true,
            ..Self::default()
        }
    }

    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }

    fn record(&self, target: &DataTarget<'_>, payload: Payload) -> Result<String, HandlerError> {
        if self.reject_saves {
            return Err(HandlerError::Rejected(format!(
                "{} refused {}",
                self.name, target.data_name
            )));
        }
        let location = format!("memory://{}/{}", target.session_key(), target.data_name);
        self.store.lock().records.push(SavedRecord {
            experiment_name: target.experiment_name.to_string(),
            ppid: target.ppid.to_string(),
            session_number: target.session_number,
            data_name: target.data_name.to_string(),
            data_type: target.data_type,
            payload,
        });
        Ok(location)
    }
}

impl DataHandler for MemoryHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, session: &SessionInfo) {
        let mut log = self.store.lock();
        log.initialised.push(session.clone());
        log.lifecycle.push(format!("{}: initialise", self.name));
    }

    fn set_up(&mut self) -> Result<(), HandlerError> {
        let mut log = self.store.lock();
        log.set_up_calls += 1;
        log.lifecycle.push(format!("{}: set_up", self.name));
        Ok(())
    }

    fn check_if_risk_of_overwrite(
        &self,
        experiment_name: &str,
        ppid: &str,
        session_number: u32,
        _root_path: Option<&Path>,
    ) -> bool {
        self.store.lock().records.iter().any(|r| {
            r.experiment_name == experiment_name
                && r.ppid == ppid
                && r.session_number == session_number
        })
    }

    fn handle_data_table(
        &mut self,
        table: &DataTable,
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        self.record(target, Payload::Table(table.clone()))
    }

    fn handle_json(
        &mut self,
        value: &Value,
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        self.record(target, Payload::Json(value.clone()))
    }

    fn handle_text(&mut self, text: &str, target: &DataTarget<'_>) -> Result<String, HandlerError> {
        self.record(target, Payload::Text(text.to_string()))
    }

    fn handle_bytes(
        &mut self,
        bytes: &[u8],
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        self.record(target, Payload::Bytes(bytes.to_vec()))
    }

    fn clean_up(&mut self) -> Result<(), HandlerError> {
        let mut log = self.store.lock();
        log.clean_up_calls += 1;
        log.lifecycle.push(format!("{}: clean_up", self.name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_payloads_and_reports_overwrite() {
        let mut handler = MemoryHandler::new();
        let store = handler.store();
        let target = DataTarget {
            experiment_name: "exp",
            ppid: "P01",
            session_number: 1,
            data_name: "notes",
            data_type: DataType::Other,
        };

        assert!(!handler.check_if_risk_of_overwrite("exp", "P01", 1, None));
        let loc = handler.handle_text("hi", &target).unwrap();
        assert_eq!(loc, "memory://exp/P01/S001/notes");
        assert!(handler.check_if_risk_of_overwrite("exp", "P01", 1, None));
        assert!(!handler.check_if_risk_of_overwrite("exp", "P01", 2, None));

        let saved = store.records_named("notes");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].payload, Payload::Text("hi".into()));
    }

    #[test]
    fn rejecting_handler_stores_nothing() {
        let mut handler = MemoryHandler::rejecting();
        let store = handler.store();
        let target = DataTarget {
            experiment_name: "exp",
            ppid: "P01",
            session_number: 1,
            data_name: "notes",
            data_type: DataType::Other,
        };
        assert!(handler.handle_bytes(&[1], &target).is_err());
        assert!(store.lock().records.is_empty());
    }
}
