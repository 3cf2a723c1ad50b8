//! Error types for clusterd

use thiserror::Error;

/// Main error type for the cluster control daemon
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Connect error: {0}")]
    ConnectError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Scheduler controller unreachable: {0}")]
    Unreachable(String),

    #[error("Control plane unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl ClusterError {
    /// Whether the caller may retry the failed operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::TimeoutError(_)
                | ClusterError::Unreachable(_)
                | ClusterError::ServiceUnavailable(_)
        )
    }
}
