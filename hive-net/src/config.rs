//! Listener configuration.

use crate::error::{ServerError, ServerResult};

/// Default cap on a single decoded frame.
pub const DEFAULT_MAX_FRAME: usize = 8 * 1024 * 1024;

/// Tunables for the accept loop and its sessions.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Pending-connection backlog handed to `listen`. Must be positive.
    pub backlog: u32,
    /// Admit more than one simultaneous connection from the same remote
    /// address. When false, a second connection from a live remote is shut
    /// down at accept time.
    pub allow_duplicate_remotes: bool,
    /// Leave Nagle's algorithm enabled on accepted sockets. Changing this
    /// on a constructed server takes effect on the next `start`.
    pub nagle: bool,
    /// Forward raw byte chunks as they arrive instead of buffering until a
    /// complete length-delimited frame is decodable.
    pub partial_frames: bool,
    /// Upper bound on a single frame in buffering mode.
    pub max_frame: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: 128,
            allow_duplicate_remotes: true,
            nagle: false,
            partial_frames: false,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

impl ServerConfig {
    pub(crate) fn validate(&self) -> ServerResult<()> {
        if self.backlog == 0 {
            return Err(ServerError::invalid_config("backlog must be positive"));
        }
        if self.max_frame == 0 {
            return Err(ServerError::invalid_config("max_frame must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_backlog_is_rejected() {
        let config = ServerConfig {
            backlog: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ServerError::InvalidConfig { .. })
        ));
    }
}
