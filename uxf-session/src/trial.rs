use serde_json::Value;
use std::time::Duration;
use uxf_core::{ResultMap, SessionError, Settings, TrialStatus};

/// Columns every begun trial carries at the front of `trial_results`.
pub const BASE_HEADERS: [&str; 8] = [
    "experiment",
    "ppid",
    "session_num",
    "trial_num",
    "block_num",
    "trial_num_in_block",
    "start_time",
    "end_time",
];

/// One measured unit of an experiment.
///
/// Trials live inside their [`Block`](crate::Block); numbers are assigned
/// by the session and are global across blocks. Begin/end transitions
/// go through the session so its cursor stays consistent.
#[derive(Debug, Clone)]
pub struct Trial {
    pub(crate) number: usize,
    pub(crate) block_number: usize,
    pub(crate) number_in_block: usize,
    pub(crate) status: TrialStatus,
    pub(crate) start_time: Option<Duration>,
    pub(crate) end_time: Option<Duration>,
    pub(crate) result: Option<ResultMap>,
    pub settings: Settings,
}

impl Trial {
    pub(crate) fn new() -> Self {
        Self {
            number: 0,
            block_number: 0,
            number_in_block: 0,
            status: TrialStatus::NotStarted,
            start_time: None,
            end_time: None,
            result: None,
            settings: Settings::default(),
        }
    }

    /// 1-based position across the whole session.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn block_number(&self) -> usize {
        self.block_number
    }

    pub fn number_in_block(&self) -> usize {
        self.number_in_block
    }

    pub fn status(&self) -> TrialStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<Duration> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<Duration> {
        self.end_time
    }

    /// `None` until the trial begins.
    pub fn result(&self) -> Option<&ResultMap> {
        self.result.as_ref()
    }

    /// Stores a result value. The trial must have begun.
    pub fn record(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), SessionError> {
        let number = self.number;
        let result = self.result.as_mut().ok_or_else(|| {
            SessionError::invalid_argument(format!("trial {} has not begun", number))
        })?;
        result.insert(key.into(), value.into());
        Ok(())
    }

    /// `result` is the seeded map; later records keep its column order.
    pub(crate) fn begin(&mut self, now: Duration, result: ResultMap) {
        self.status = TrialStatus::InProgress;
        self.start_time = Some(now);
        self.end_time = None;
        self.result = Some(result);
    }

    pub(crate) fn end(&mut self, now: Duration) {
        self.status = TrialStatus::Done;
        self.end_time = Some(now);
    }
}
