//! Cooperative actor runtime for the Hive node.
//!
//! Agents are long-lived stateful entities multiplexed over a fixed pool of
//! scheduler threads. Each scheduler round-robins its agents, advancing one
//! cooperative main step and draining one mailbox slot per sweep. An agent is
//! only ever stepped by the scheduler that owns it; producers on any thread
//! inject work through [`ActorRef::post_async`]. IO integration lives in
//! higher level crates and talks to the runtime exclusively through posts.

pub mod actor;
pub mod context;
pub mod error;
pub mod failures;
pub mod mailbox;
pub mod operation;
pub mod scheduler;
pub mod sync;
pub mod timer;

pub use actor::{ActorId, ActorRef, Agent, Message, WeakActorRef};
pub use context::Context;
pub use error::{ActorError, ActorResult};
pub use failures::{FailureOrigin, FailureRecord, FailureSink};
pub use operation::Operation;
pub use sync::WaitHandle;
pub use timer::Timer;
