use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("{0} has not been set up")]
    NotSetUp(String),

    #[error("background writer is no longer running")]
    WorkerGone,

    #[error("{failed} background write(s) failed, first: {first}")]
    Background { failed: usize, first: String },

    #[error("{0}")]
    Rejected(String),
}

impl From<reqwest::Error> for HandlerError {
    fn from(e: reqwest::Error) -> Self {
        HandlerError::Upload(e.to_string())
    }
}
