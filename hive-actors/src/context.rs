//! Pool of schedulers owning the lifetime of all actors spawned on it.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use once_cell::sync::Lazy;
use tracing::info;

use crate::actor::{ActorCell, ActorRef, Agent};
use crate::error::{ActorError, ActorResult};
use crate::failures::FailureSink;
use crate::scheduler::{Schedulable, Scheduler};

static GLOBAL: Lazy<Context> = Lazy::new(Context::with_default_size);

/// Fixed-size pool of schedulers. New actors are routed to the scheduler
/// with the smallest active count; the balance read is racy on purpose,
/// exact balance is not required.
pub struct Context {
    schedulers: Vec<Scheduler>,
    disposed: AtomicBool,
    sink: Arc<FailureSink>,
}

impl Context {
    /// Create a context with `schedulers` worker threads.
    pub fn new(schedulers: usize) -> ActorResult<Self> {
        Self::with_failure_sink(schedulers, FailureSink::global())
    }

    /// Create a context reporting step failures to a caller-owned sink.
    pub fn with_failure_sink(schedulers: usize, sink: Arc<FailureSink>) -> ActorResult<Self> {
        if schedulers == 0 {
            return Err(ActorError::invalid("scheduler count must be at least 1"));
        }
        let schedulers: Vec<_> = (0..schedulers).map(Scheduler::start).collect();
        info!(target: "hive::context", schedulers = schedulers.len(), "context started");
        Ok(Self {
            schedulers,
            disposed: AtomicBool::new(false),
            sink,
        })
    }

    /// Create a context sized to the host's logical CPU count.
    pub fn with_default_size() -> Self {
        let n = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);
        Self::new(n).expect("default-sized context")
    }

    /// The process-wide context, lazily initialized on first use. It is
    /// never disposed automatically; an actor leaked on it keeps its
    /// scheduler slot until process exit.
    pub fn global() -> &'static Context {
        &GLOBAL
    }

    pub fn scheduler_count(&self) -> usize {
        self.schedulers.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The sink this context's actors report step failures to.
    pub fn failure_sink(&self) -> &Arc<FailureSink> {
        &self.sink
    }

    /// Spawn an agent, binding it to the least-loaded scheduler.
    pub fn spawn<A: Agent>(&self, agent: A) -> ActorResult<ActorRef<A>> {
        if self.is_disposed() {
            return Err(ActorError::Disposed);
        }
        let cell = ActorCell::new(agent, Arc::clone(&self.sink));
        let target = self
            .schedulers
            .iter()
            .min_by_key(|scheduler| scheduler.load())
            .expect("context has at least one scheduler");
        target.register(cell.clone() as Arc<dyn Schedulable>);
        Ok(ActorRef::from_cell(cell))
    }

    /// Dispose every scheduler in order. Each scheduler finishes its
    /// current sweep, reports quiescence, and tears down every actor that
    /// was registered with it. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for scheduler in &self.schedulers {
            scheduler.dispose();
        }
        info!(target: "hive::context", "context disposed");
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.dispose();
    }
}
