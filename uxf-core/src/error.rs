use thiserror::Error;

/// Errors raised while navigating or mutating a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A trial or block reference that does not exist.
    #[error("no such trial: {0}")]
    NoSuchTrial(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session has already been initialised")]
    AlreadyInitialised,

    #[error("session has not been initialised")]
    NotInitialised,

    #[error("trial {0} is not in progress")]
    TrialNotInProgress(usize),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl SessionError {
    pub fn no_such_trial(msg: impl Into<String>) -> Self {
        Self::NoSuchTrial(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("column `{0}` is not part of the table header")]
    UnknownColumn(String),

    #[error("row is missing column `{0}`")]
    MissingColumn(String),

    #[error("column `{0}` appears more than once")]
    DuplicateColumn(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("setting `{0}` not found")]
    Missing(String),

    #[error("setting `{key}` is not a {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("settings file must contain a JSON object")]
    NotAnObject,

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}
