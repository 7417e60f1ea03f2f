//! Process-wide failure sink.
//!
//! Uncaught panics escaping an actor step and transport-level faults are
//! appended here instead of unwinding through the scheduler. The sink is a
//! diagnostic surface, not a replacement for in-actor error handling.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::error;

static GLOBAL: Lazy<Arc<FailureSink>> = Lazy::new(|| Arc::new(FailureSink::new()));

/// Where a recorded failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    /// A message closure panicked inside an actor.
    Handler,
    /// An actor's main step panicked.
    MainStep,
    /// An actor's teardown hook panicked.
    Teardown,
    /// A socket-level fault on the accept or receive path.
    Transport,
}

impl std::fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Handler => "handler",
            Self::MainStep => "main-step",
            Self::Teardown => "teardown",
            Self::Transport => "transport",
        };
        f.write_str(name)
    }
}

/// One recorded failure.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
    /// Which part of the runtime it escaped from.
    pub origin: FailureOrigin,
    /// Human-readable payload of the panic or error.
    pub detail: String,
}

/// Append-only, thread-safe collection of runtime failures.
///
/// A process-wide instance is reachable through [`FailureSink::global`];
/// tests construct private sinks and hand them to their contexts instead.
#[derive(Default)]
pub struct FailureSink {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide sink, lazily initialized on first use.
    pub fn global() -> Arc<FailureSink> {
        Arc::clone(&GLOBAL)
    }

    /// Append a record and emit it on the log.
    pub fn record<S: Into<String>>(&self, origin: FailureOrigin, detail: S) {
        let detail = detail.into();
        error!(target: "hive::failures", %origin, detail = %detail, "runtime failure recorded");
        self.records.lock().push(FailureRecord {
            at: Utc::now(),
            origin,
            detail,
        });
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<FailureRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drop all records. Diagnostic tooling only.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

/// Render a panic payload the way `std` would print it.
pub(crate) fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let sink = FailureSink::new();
        assert!(sink.is_empty());

        sink.record(FailureOrigin::Handler, "boom");
        sink.record(FailureOrigin::Transport, "reset by peer");

        let records = sink.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].origin, FailureOrigin::Handler);
        assert_eq!(records[0].detail, "boom");
        assert_eq!(records[1].origin, FailureOrigin::Transport);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_panic_detail_downcasts() {
        assert_eq!(panic_detail(Box::new("static")), "static");
        assert_eq!(panic_detail(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_detail(Box::new(42u32)), "opaque panic payload");
    }
}
