//! Error types for the TCP ingress.

use thiserror::Error;

/// Errors surfaced by the server and session surface.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A configuration precondition failed.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What was wrong.
        message: String,
    },

    /// `start` was called while the server is running.
    #[error("server is already running")]
    AlreadyRunning,

    /// `stop` was called while the server is not running.
    #[error("server is not running")]
    NotRunning,

    /// The session was disconnected before or during the operation.
    #[error("session is closed")]
    SessionClosed,

    /// Socket-level failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create an invalid-configuration error.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;
