//! Wall-clock triggers that post into actor mailboxes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::actor::{ActorRef, Agent, WeakActorRef};

struct TimerState {
    due_in: Duration,
    period: Duration,
    /// False after a one-shot has fired; `change` re-arms.
    armed: bool,
    /// Bumped by `change` so an in-progress wait restarts with new timing.
    epoch: u64,
}

struct TimerInner {
    state: Mutex<TimerState>,
    cond: Condvar,
    cancelled: AtomicBool,
}

/// Recurring or one-shot trigger bound to a target actor.
///
/// On each fire the callback is posted to the target's mailbox via
/// `post_async`; it never runs on the clock thread itself. The timer holds
/// only a weak target reference: once the last [`ActorRef`] is gone, the
/// clock thread winds down on its next fire. A `period` of zero makes the
/// timer one-shot.
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    pub fn new<A, F>(target: &ActorRef<A>, callback: F, delay: Duration, period: Duration) -> Timer
    where
        A: Agent,
        F: Fn(&mut A) + Send + Sync + 'static,
    {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState {
                due_in: delay,
                period,
                armed: true,
                epoch: 0,
            }),
            cond: Condvar::new(),
            cancelled: AtomicBool::new(false),
        });

        let clock = Arc::clone(&inner);
        let target = target.downgrade();
        let callback: Arc<dyn Fn(&mut A) + Send + Sync> = Arc::new(callback);
        thread::Builder::new()
            .name("hive-timer".into())
            .spawn(move || run(clock, target, callback))
            .expect("spawn timer thread");

        Timer { inner }
    }

    /// Re-arm with a new delay and period, superseding the current wait.
    pub fn change(&self, delay: Duration, period: Duration) {
        let mut state = self.inner.state.lock();
        state.due_in = delay;
        state.period = period;
        state.armed = true;
        state.epoch += 1;
        self.inner.cond.notify_all();
    }

    /// Stop the clock source. Exactly one call has effect; a callback
    /// already posted to the target still runs.
    pub fn dispose(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        // Take the state lock so the notify cannot slip between the clock
        // thread's cancel check and its wait.
        let _state = self.inner.state.lock();
        self.inner.cond.notify_all();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run<A: Agent>(
    inner: Arc<TimerInner>,
    target: WeakActorRef<A>,
    callback: Arc<dyn Fn(&mut A) + Send + Sync>,
) {
    let mut guard = inner.state.lock();
    loop {
        let epoch = guard.epoch;
        let deadline = guard.armed.then(|| Instant::now() + guard.due_in);

        // Wait until the deadline passes, the timer is re-armed, or it is
        // disposed. A disarmed one-shot parks here until one of the latter.
        let fired = loop {
            if inner.cancelled.load(Ordering::Acquire) {
                return;
            }
            if guard.epoch != epoch {
                break false;
            }
            match deadline {
                Some(deadline) => {
                    if inner.cond.wait_until(&mut guard, deadline).timed_out() {
                        break true;
                    }
                }
                None => inner.cond.wait(&mut guard),
            }
        };
        if !fired {
            continue;
        }
        if inner.cancelled.load(Ordering::Acquire) || guard.epoch != epoch {
            continue;
        }

        if guard.period.is_zero() {
            guard.armed = false;
        } else {
            guard.due_in = guard.period;
        }

        drop(guard);
        let Some(actor) = target.upgrade() else {
            trace!(target: "hive::timer", "target gone, clock thread exiting");
            return;
        };
        let callback = Arc::clone(&callback);
        if actor.post_async(move |state| callback(state)).is_err() {
            return;
        }
        guard = inner.state.lock();
    }
}
