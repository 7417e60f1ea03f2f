//! Accepted-connection state shared between the IO tasks and the runtime.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ServerError, ServerResult};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Capability token held by a session. The set only ever grows; the initial
/// grant on accept is `Connected`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Capability {
    Connected = 0x01,
    Authenticated = 0x02,
    Established = 0x04,
}

impl Capability {
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    #[inline]
    pub fn belongs(self, set: u32) -> bool {
        (self.as_u32() & set) != 0
    }
}

/// One accepted TCP connection.
///
/// Frame handling never runs on the session's IO tasks: decoded frames are
/// handed to the propagator, which posts them into actor mailboxes. The
/// outbound path is a queue drained by the session's writer task.
pub struct Session {
    id: u64,
    remote: SocketAddr,
    capabilities: AtomicU32,
    disconnected: AtomicBool,
    outbound: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(remote: SocketAddr, outbound: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            remote,
            capabilities: AtomicU32::new(0),
            disconnected: AtomicBool::new(false),
            outbound,
            cancel: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Add a capability to the session's set.
    pub fn grant(&self, capability: Capability) {
        self.capabilities
            .fetch_or(capability.as_u32(), Ordering::AcqRel);
    }

    /// Whether the session holds `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        capability.belongs(self.capabilities.load(Ordering::Acquire))
    }

    /// Raw capability bits, for diagnostics.
    pub fn capabilities(&self) -> u32 {
        self.capabilities.load(Ordering::Acquire)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Queue an outbound frame. In buffering mode the writer adds the
    /// length prefix; in partial mode the bytes go out as-is.
    pub fn send(&self, frame: Bytes) -> ServerResult<()> {
        if self.is_disconnected() {
            return Err(ServerError::SessionClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| ServerError::SessionClosed)
    }

    /// Ask the IO tasks to wind the connection down. The disconnected
    /// observer fires once the tasks have exited; calling this more than
    /// once is harmless.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Flip the disconnect-once flag. Returns whether this call was first.
    pub(crate) fn mark_disconnected(&self) -> bool {
        !self.disconnected.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn session() -> Session {
        let (tx, _rx) = mpsc::unbounded_channel();
        Session::new("127.0.0.1:4000".parse().unwrap(), tx)
    }

    #[test]
    fn test_capabilities_grow_monotonically() {
        let session = session();
        assert!(!session.has(Capability::Connected));

        session.grant(Capability::Connected);
        assert!(session.has(Capability::Connected));
        assert!(!session.has(Capability::Authenticated));

        session.grant(Capability::Authenticated);
        assert!(session.has(Capability::Connected));
        assert!(session.has(Capability::Authenticated));
        assert_eq!(
            session.capabilities(),
            Capability::Connected.as_u32() | Capability::Authenticated.as_u32()
        );
    }

    #[test]
    fn test_disconnect_once_flag() {
        let session = session();
        assert!(session.mark_disconnected());
        assert!(!session.mark_disconnected());
        assert!(session.is_disconnected());
    }

    #[test]
    fn test_send_after_disconnect_fails() {
        let session = session();
        session.mark_disconnected();
        assert!(matches!(
            session.send(Bytes::from_static(b"x")),
            Err(ServerError::SessionClosed)
        ));
    }
}
