//! Boundary between decoded frames and the actor runtime.

use std::sync::Arc;

use bytes::Bytes;

use crate::session::Session;

/// Routes decoded frames to their destination actors.
///
/// Implementations resolve the actors addressed by `frame` and hand it over
/// with `post_async`, so frame handling runs on scheduler threads, never on
/// the session's IO tasks. `propagate` is called from those IO tasks and
/// must not block.
pub trait Propagator: Send + Sync + 'static {
    fn propagate(&self, session: &Arc<Session>, frame: Bytes);
}
