//! Signaling primitives shared by the scheduler and the public wait surface.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct Flag {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Flag {
    fn new(initial: bool) -> Self {
        Self {
            state: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    fn raise(&self) {
        let mut state = self.state.lock();
        *state = true;
        self.cond.notify_all();
    }
}

/// Auto-reset wake signal. Level-triggered: a `set` before `wait` is not
/// lost, and `wait` consumes the signal.
pub(crate) struct Signal(Flag);

impl Signal {
    pub(crate) fn new() -> Self {
        Self(Flag::new(false))
    }

    pub(crate) fn set(&self) {
        self.0.raise();
    }

    pub(crate) fn wait(&self) {
        let mut state = self.0.state.lock();
        while !*state {
            self.0.cond.wait(&mut state);
        }
        *state = false;
    }
}

/// Manual-reset gate. Stays set until explicitly reset.
pub(crate) struct Gate(Flag);

impl Gate {
    pub(crate) fn new(initial: bool) -> Self {
        Self(Flag::new(initial))
    }

    pub(crate) fn set(&self) {
        self.0.raise();
    }

    pub(crate) fn reset(&self) {
        *self.0.state.lock() = false;
    }

    pub(crate) fn wait(&self) {
        let mut state = self.0.state.lock();
        while !*state {
            self.0.cond.wait(&mut state);
        }
    }

    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.0.state.lock();
        while !*state {
            if self.0.cond.wait_until(&mut state, deadline).timed_out() {
                return *state;
            }
        }
        true
    }
}

/// One-shot waitable handed back by [`crate::ActorRef::post_wait`].
///
/// `signal` is idempotent; the second and later calls are no-ops. Treat the
/// handle as single-wait, single-signal: waiting from inside the target
/// actor's own message handler self-deadlocks.
#[derive(Clone)]
pub struct WaitHandle {
    gate: Arc<Gate>,
}

impl WaitHandle {
    pub(crate) fn new() -> Self {
        Self {
            gate: Arc::new(Gate::new(false)),
        }
    }

    /// Mark the handle signaled. No effect if already signaled.
    pub fn signal(&self) {
        self.gate.set();
    }

    /// Block until the handle is signaled.
    pub fn wait(&self) {
        self.gate.wait();
    }

    /// Block until the handle is signaled or `timeout` elapses.
    /// Returns whether the handle was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.gate.wait_for(timeout)
    }

    /// Whether the handle has been signaled.
    pub fn is_signaled(&self) -> bool {
        *self.gate.0.state.lock()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_handle_signal_idempotent() {
        let handle = WaitHandle::new();
        assert!(!handle.is_signaled());

        handle.signal();
        handle.signal();
        assert!(handle.is_signaled());
        handle.wait();
        assert!(handle.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_handle_cross_thread() {
        let handle = WaitHandle::new();
        let signaler = handle.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signaler.signal();
        });
        assert!(handle.wait_timeout(Duration::from_secs(2)));
    }

    #[test]
    fn test_signal_is_level_triggered() {
        let signal = Signal::new();
        signal.set();
        signal.set();
        // A set before the wait is observed once, then consumed.
        signal.wait();
        assert!(!*signal.0.state.lock());
    }

    #[test]
    fn test_gate_reset() {
        let gate = Gate::new(true);
        gate.wait();
        gate.reset();
        assert!(!gate.wait_for(Duration::from_millis(20)));
        gate.set();
        assert!(gate.wait_for(Duration::from_millis(20)));
    }
}
