use crate::error::HandlerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use uxf_core::{DataTable, DataType, session_num_to_name};

/// Identity of the session a handler is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub experiment_name: String,
    pub ppid: String,
    pub session_number: u32,
}

/// Where a payload belongs. Each handler maps this tuple to its own
/// concrete location.
#[derive(Debug, Clone, Copy)]
pub struct DataTarget<'a> {
    pub experiment_name: &'a str,
    pub ppid: &'a str,
    pub session_number: u32,
    pub data_name: &'a str,
    pub data_type: DataType,
}

impl DataTarget<'_> {
    /// `experiment/ppid/S001`
    pub fn session_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.experiment_name,
            self.ppid,
            session_num_to_name(self.session_number)
        )
    }
}

/// A persistence backend.
///
/// Save calls return a location descriptor (path, URI, ...). Handlers may
/// defer the actual write to a background worker, but `clean_up` must not
/// return until every deferred write has finished.
pub trait DataHandler: Send {
    fn name(&self) -> &str;

    /// Called when the owning session begins, before `set_up`.
    fn initialise(&mut self, _session: &SessionInfo) {}

    /// Opens files, connections or workers.
    fn set_up(&mut self) -> Result<(), HandlerError>;

    /// Whether saving under this identity could clobber earlier data.
    fn check_if_risk_of_overwrite(
        &self,
        experiment_name: &str,
        ppid: &str,
        session_number: u32,
        root_path: Option<&Path>,
    ) -> bool;

    fn handle_data_table(
        &mut self,
        table: &DataTable,
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError>;

    /// `value` is a JSON list or mapping.
    fn handle_json(&mut self, value: &Value, target: &DataTarget<'_>)
    -> Result<String, HandlerError>;

    fn handle_text(&mut self, text: &str, target: &DataTarget<'_>) -> Result<String, HandlerError>;

    fn handle_bytes(&mut self, bytes: &[u8], target: &DataTarget<'_>)
    -> Result<String, HandlerError>;

    /// Flushes and closes. Blocks until outstanding writes complete.
    fn clean_up(&mut self) -> Result<(), HandlerError>;
}
