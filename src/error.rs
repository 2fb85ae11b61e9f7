use thiserror::Error;

/// Step tracker error types
#[derive(Error, Debug, Clone)]
pub enum TrackerError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
