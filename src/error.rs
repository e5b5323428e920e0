//! Error taxonomy for progression operations

/// Errors surfaced by the store, the service, the HTTP layer and the poller
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Missing ids or out-of-range input, rejected before storage is touched
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Network failure or timeout talking to the backend
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered with a non-success status
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    /// Persisted state breaks a uniqueness guarantee
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// The polling loop has exited and cannot take commands
    #[error("poller is not running")]
    PollerStopped,
}

impl ProgressError {
    /// Failures that the next poll tick may resolve on its own
    pub fn is_transient(&self) -> bool {
        match self {
            ProgressError::Storage(_) | ProgressError::Io(_) | ProgressError::Transport(_) => true,
            ProgressError::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProgressError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProgressError::Transport(format!("request timed out: {}", err))
        } else {
            ProgressError::Transport(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for ProgressError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProgressError::Transport("operation timed out".to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProgressError>;
