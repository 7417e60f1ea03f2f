//! Error types for the actor runtime.

use thiserror::Error;

/// Errors surfaced at the runtime's library boundary.
#[derive(Error, Debug)]
pub enum ActorError {
    /// The target actor (or its context/scheduler) has been disposed.
    #[error("actor is disposed")]
    Disposed,

    /// A precondition failed at an entry point.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the call.
        message: String,
    },
}

impl ActorError {
    /// Create an invalid-argument error.
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Result type for runtime operations.
pub type ActorResult<T> = std::result::Result<T, ActorError>;
