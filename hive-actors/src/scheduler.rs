//! Worker threads that step actors cooperatively.
//!
//! Each scheduler is one dedicated OS thread running a round-robin sweep
//! over its owned actors. There is no work stealing and no preemption: an
//! actor that blocks inside a step blocks the whole scheduler, which is a
//! correctness bug in the actor, not in the runtime.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::actor::ActorId;
use crate::sync::{Gate, Signal};

/// Type-erased view of an actor cell, as the scheduler sees it.
pub(crate) trait Schedulable: Send + Sync {
    fn id(&self) -> ActorId;
    fn is_disposed(&self) -> bool;
    /// Stamp the owning scheduler. First call wins; later calls are no-ops.
    fn bind(&self, core: Arc<SchedulerCore>);
    /// Claim ownership: false means another sweep already holds the actor.
    fn try_activate(&self) -> bool;
    /// Advance the main step and one mailbox slot. Returns whether the
    /// actor still has work and stays in the active list.
    fn sweep(&self) -> bool;
    /// Teardown outside the sweep, used when the scheduler itself goes away.
    fn dispose_now(&self);
}

/// State shared between the scheduler thread and its producers.
pub(crate) struct SchedulerCore {
    name: String,
    /// Pending actors handed over by `enqueue`; drained only by the sweep.
    arrivals: SegQueue<Arc<dyn Schedulable>>,
    wake: Signal,
    /// Set whenever the sweep has gone idle; shutdown blocks on it to
    /// observe quiescence.
    processed: Gate,
    running: AtomicBool,
    /// Size of the active list, read racily for least-loaded routing.
    load: AtomicUsize,
    /// Every actor ever bound here, disposed on shutdown.
    registry: Mutex<Vec<Weak<dyn Schedulable>>>,
}

impl SchedulerCore {
    /// Hand an actor to the sweep and wake it. Callable from any thread;
    /// duplicates are filtered by the active flag at drain time.
    pub(crate) fn enqueue(&self, actor: Arc<dyn Schedulable>) {
        self.arrivals.push(actor);
        self.wake.set();
    }
}

/// One scheduler: shared core plus the dedicated worker thread.
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub(crate) fn start(index: usize) -> Self {
        let name = format!("hive-sched-{index}");
        let core = Arc::new(SchedulerCore {
            name: name.clone(),
            arrivals: SegQueue::new(),
            wake: Signal::new(),
            processed: Gate::new(true),
            running: AtomicBool::new(true),
            load: AtomicUsize::new(0),
            registry: Mutex::new(Vec::new()),
        });

        let body = Arc::clone(&core);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(body))
            .expect("spawn scheduler thread");

        Self {
            core,
            thread: Mutex::new(Some(handle)),
        }
    }

    /// Bind a new actor to this scheduler and queue its first activation.
    pub(crate) fn register(&self, actor: Arc<dyn Schedulable>) {
        actor.bind(Arc::clone(&self.core));
        {
            let mut registry = self.core.registry.lock();
            registry.retain(|weak| weak.strong_count() > 0);
            registry.push(Arc::downgrade(&actor));
        }
        debug!(target: "hive::scheduler", scheduler = %self.core.name, actor = %actor.id(), "actor registered");
        self.core.enqueue(actor);
    }

    /// Number of actors currently held by the sweep. Racy by design.
    pub fn load(&self) -> usize {
        self.core.load.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Stop the worker and dispose every actor that was registered here.
    ///
    /// The current sweep finishes, the processed gate reports quiescence,
    /// the thread is joined, then registered actors are torn down exactly
    /// once each (their own disposed flag makes this idempotent).
    pub(crate) fn dispose(&self) {
        if !self.core.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.core.wake.set();
        self.core.processed.wait();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }

        let registered: Vec<_> = self.core.registry.lock().drain(..).collect();
        let mut disposed = 0usize;
        for weak in registered {
            if let Some(actor) = weak.upgrade() {
                actor.dispose_now();
                disposed += 1;
            }
        }
        info!(target: "hive::scheduler", scheduler = %self.core.name, disposed, "scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run(core: Arc<SchedulerCore>) {
    debug!(target: "hive::scheduler", scheduler = %core.name, "worker started");
    let mut active: Vec<Arc<dyn Schedulable>> = Vec::new();

    loop {
        core.wake.wait();
        if !core.running.load(Ordering::Acquire) {
            break;
        }
        core.processed.reset();
        drain_arrivals(&core, &mut active);

        while !active.is_empty() && core.running.load(Ordering::Acquire) {
            drain_arrivals(&core, &mut active);
            active.retain(|actor| {
                let keep = actor.sweep();
                if !keep {
                    core.load.fetch_sub(1, Ordering::Relaxed);
                }
                keep
            });
            // Keep a list full of Continue-yielding actors from pinning the
            // CPU against sibling threads.
            thread::yield_now();
        }

        core.processed.set();
    }

    // Anything still active here is torn down by dispose() via the registry.
    core.processed.set();
    debug!(target: "hive::scheduler", scheduler = %core.name, "worker exited");
}

fn drain_arrivals(core: &Arc<SchedulerCore>, active: &mut Vec<Arc<dyn Schedulable>>) {
    while let Some(actor) = core.arrivals.pop() {
        if actor.is_disposed() {
            continue;
        }
        // Lost race: the actor is already owned by a live sweep entry.
        if !actor.try_activate() {
            continue;
        }
        core.load.fetch_add(1, Ordering::Relaxed);
        active.push(actor);
    }
}
