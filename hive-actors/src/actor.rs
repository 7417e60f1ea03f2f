//! Agents and the cell that couples them to a scheduler.
//!
//! An [`Agent`] is plain state plus two cooperative step hooks. The runtime
//! wraps it in an `ActorCell` that owns the mailbox, the lifecycle flags and
//! the scheduler binding; callers hold [`ActorRef`] handles. Exactly one
//! scheduler thread ever executes a step of a given agent: steps run under
//! the cell's state lock, and the lock is only taken from the sweep (or from
//! scheduler teardown, which happens strictly after the sweep thread exits).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{ActorError, ActorResult};
use crate::failures::{panic_detail, FailureOrigin, FailureSink};
use crate::mailbox::{Envelope, Mailbox};
use crate::operation::Operation;
use crate::scheduler::{Schedulable, SchedulerCore};
use crate::sync::{Gate, WaitHandle};

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of an actor within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

impl ActorId {
    fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One deferred closure addressed to an agent of type `A`.
pub struct Message<A>(Box<dyn FnOnce(&mut A) + Send>);

impl<A> Message<A> {
    pub(crate) fn new(f: Box<dyn FnOnce(&mut A) + Send>) -> Self {
        Self(f)
    }

    /// Run the closure against the agent state.
    pub fn invoke(self, state: &mut A) {
        (self.0)(state)
    }
}

/// Stateful entity stepped cooperatively by its owning scheduler.
///
/// The default agent has no main routine (it parks immediately) and handles
/// messages by invoking them. Long-running behavior overrides [`advance`];
/// custom dispatch or instrumentation overrides [`on_message`].
///
/// [`advance`]: Agent::advance
/// [`on_message`]: Agent::on_message
pub trait Agent: Send + 'static {
    /// One step of the main routine. Yield [`Operation::Continue`] to be
    /// stepped again next sweep, [`Operation::Break`] to park until a post
    /// re-animates the actor, [`Operation::Dispose`] to tear down.
    fn advance(&mut self) -> Operation {
        Operation::Break
    }

    /// Handle one dequeued message. The returned operation is honored the
    /// same way as from the main routine.
    fn on_message(&mut self, msg: Message<Self>) -> Operation
    where
        Self: Sized,
    {
        msg.invoke(self);
        Operation::Continue
    }

    /// Teardown hook, run exactly once during disposal.
    fn on_dispose(&mut self) {}
}

pub(crate) struct ActorCell<A: Agent> {
    id: ActorId,
    state: Mutex<A>,
    mailbox: Mailbox<A>,
    /// True while a scheduler holds the actor in its active list.
    active: AtomicBool,
    /// Monotonic: once set, no further step executes.
    disposed: AtomicBool,
    join_gate: Gate,
    /// Stamped at registration, never reassigned while the actor lives.
    scheduler: OnceLock<Arc<SchedulerCore>>,
    sink: Arc<FailureSink>,
}

impl<A: Agent> ActorCell<A> {
    pub(crate) fn new(agent: A, sink: Arc<FailureSink>) -> Arc<Self> {
        Arc::new(Self {
            id: ActorId::next(),
            state: Mutex::new(agent),
            mailbox: Mailbox::new(),
            active: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            join_gate: Gate::new(false),
            scheduler: OnceLock::new(),
            sink,
        })
    }

    /// Set the disposed flag once and run teardown. Safe from any thread;
    /// the scheduler path reaches this between steps, the teardown path
    /// only after the scheduler thread has quiesced.
    pub(crate) fn finalize(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let teardown = {
            let mut state = self.state.lock();
            catch_unwind(AssertUnwindSafe(|| state.on_dispose()))
        };
        if let Err(payload) = teardown {
            self.sink
                .record(FailureOrigin::Teardown, panic_detail(payload));
        }
        self.mailbox.drain();
        self.join_gate.set();
        trace!(target: "hive::actor", actor = %self.id, "disposed");
    }

    fn dispose_and_drop(&self) -> bool {
        self.finalize();
        false
    }
}

impl<A: Agent> Schedulable for ActorCell<A> {
    fn id(&self) -> ActorId {
        self.id
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn bind(&self, core: Arc<SchedulerCore>) {
        let _ = self.scheduler.set(core);
    }

    fn try_activate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn sweep(&self) -> bool {
        if self.is_disposed() {
            return false;
        }

        // Main side.
        let mut state = self.state.lock();
        let main_more = match catch_unwind(AssertUnwindSafe(|| state.advance())) {
            Ok(Operation::Continue) => true,
            Ok(Operation::Break) => false,
            Ok(Operation::Dispose) => {
                drop(state);
                return self.dispose_and_drop();
            }
            Err(payload) => {
                drop(state);
                self.sink
                    .record(FailureOrigin::MainStep, panic_detail(payload));
                return self.dispose_and_drop();
            }
        };

        // Message side. Evaluated every sweep even when the main routine
        // yielded Break, otherwise a parked main starves the mailbox.
        let msg_more = match self.mailbox.try_dequeue() {
            None => false,
            Some(Envelope::Dispose) => {
                drop(state);
                return self.dispose_and_drop();
            }
            Some(Envelope::Call(f)) => {
                match catch_unwind(AssertUnwindSafe(|| state.on_message(Message::new(f)))) {
                    Ok(Operation::Dispose) => {
                        drop(state);
                        return self.dispose_and_drop();
                    }
                    Ok(_) => !self.mailbox.is_empty(),
                    Err(payload) => {
                        drop(state);
                        self.sink
                            .record(FailureOrigin::Handler, panic_detail(payload));
                        return self.dispose_and_drop();
                    }
                }
            }
        };
        drop(state);

        if main_more || msg_more {
            return true;
        }

        // Park. A post that raced the drain above either re-animates the
        // actor through its own producer kick, or is caught by this
        // re-check; reclaiming the active flag keeps both paths single-owner.
        self.active.store(false, Ordering::Release);
        if !self.mailbox.is_empty() && self.try_activate() {
            return true;
        }
        false
    }

    fn dispose_now(&self) {
        self.finalize();
    }
}

/// Cloneable handle to a spawned actor.
pub struct ActorRef<A: Agent> {
    cell: Arc<ActorCell<A>>,
}

impl<A: Agent> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<A: Agent> ActorRef<A> {
    pub(crate) fn from_cell(cell: Arc<ActorCell<A>>) -> Self {
        Self { cell }
    }

    pub fn id(&self) -> ActorId {
        self.cell.id
    }

    /// Whether the actor has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }

    /// Enqueue a closure for execution on the actor's scheduler thread.
    ///
    /// Closures posted from one thread execute in post order. The producer
    /// that turns an empty mailbox non-empty re-animates a parked actor;
    /// every other interleaving is already covered by the running sweep.
    pub fn post_async(&self, f: impl FnOnce(&mut A) + Send + 'static) -> ActorResult<()> {
        if self.cell.is_disposed() {
            return Err(ActorError::Disposed);
        }
        if self.cell.mailbox.post(Envelope::Call(Box::new(f))) {
            self.kick();
        }
        Ok(())
    }

    /// Post a closure and get back a one-shot gate signaled after the
    /// closure has executed.
    ///
    /// Waiting on the handle from inside the target actor self-deadlocks.
    /// If the actor is disposed before the closure runs, the gate is never
    /// signaled; use [`WaitHandle::wait_timeout`] when that can happen.
    pub fn post_wait(&self, f: impl FnOnce(&mut A) + Send + 'static) -> ActorResult<WaitHandle> {
        let handle = WaitHandle::new();
        let gate = handle.clone();
        self.post_async(move |state| {
            f(state);
            gate.signal();
        })?;
        Ok(handle)
    }

    /// Request orderly teardown. Routed through the mailbox so the teardown
    /// runs on the owning scheduler thread, never concurrently with another
    /// step. Idempotent: disposing a disposed actor is a no-op.
    pub fn dispose(&self) {
        if self.cell.is_disposed() {
            return;
        }
        if self.cell.mailbox.post(Envelope::Dispose) {
            self.kick();
        }
    }

    /// Block until disposal has completed.
    pub fn join(&self) {
        self.cell.join_gate.wait();
    }

    /// Block until disposal has completed or `timeout` elapses. Returns
    /// whether the actor was disposed in time.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        self.cell.join_gate.wait_for(timeout)
    }

    /// Downgrade to a handle that does not keep the actor alive.
    pub fn downgrade(&self) -> WeakActorRef<A> {
        WeakActorRef {
            cell: Arc::downgrade(&self.cell),
        }
    }

    fn kick(&self) {
        if let Some(core) = self.cell.scheduler.get() {
            core.enqueue(Arc::clone(&self.cell) as Arc<dyn Schedulable>);
        }
    }
}

/// Non-owning counterpart of [`ActorRef`], used by timers so a scheduled
/// callback does not keep an otherwise-unreferenced actor alive.
pub struct WeakActorRef<A: Agent> {
    cell: Weak<ActorCell<A>>,
}

impl<A: Agent> Clone for WeakActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
        }
    }
}

impl<A: Agent> WeakActorRef<A> {
    pub fn upgrade(&self) -> Option<ActorRef<A>> {
        self.cell.upgrade().map(ActorRef::from_cell)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_actor_ids_are_unique() {
        let a = ActorId::next();
        let b = ActorId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
