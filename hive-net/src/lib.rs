//! TCP ingress for the hive actor runtime.
//!
//! This crate owns the accept loop and per-connection IO. Decoded frames are
//! handed to a [`Propagator`], which routes them into actor mailboxes via
//! `post_async`; nothing in this crate runs frame-handling code on an IO
//! task. Transport faults land in the shared failure sink alongside actor
//! step failures.

pub mod codec;
pub mod config;
pub mod error;
pub mod propagator;
pub mod server;
pub mod session;

pub use codec::FrameCodec;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use propagator::Propagator;
pub use server::Server;
pub use session::{Capability, Session};
