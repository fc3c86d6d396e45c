use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Per-trial results, filled in by the caller while the trial runs.
pub type ResultMap = Map<String, Value>;

/// Trial lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrialStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

/// Classification tag passed to data handlers alongside every payload.
/// Handlers may pick a sub-location from it; save semantics do not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    SessionInfo,
    TrialResults,
    #[default]
    Other,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::SessionInfo => "session_info",
            DataType::TrialResults => "trial_results",
            DataType::Other => "other",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String form of a value as written into a comma-delimited cell.
/// Null becomes the empty string; embedded commas become underscores.
pub fn format_cell(value: &Value) -> String {
    let text = match value {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.replace(',', "_")
}

/// `3` → `S003`
pub fn session_num_to_name(num: u32) -> String {
    format!("S{:03}", num)
}
