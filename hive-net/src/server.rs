//! TCP listener feeding the actor runtime.
//!
//! The server owns its tokio runtime; accept and per-session IO run there
//! while all frame handling is pushed into actor mailboxes through the
//! propagator. Callers drive the server from plain threads.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hive_actors::{FailureOrigin, FailureSink};

use crate::codec::FrameCodec;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::propagator::Propagator;
use crate::session::{Capability, Session};

/// Callback invoked when a session joins or leaves the live list.
pub type SessionObserver = Box<dyn Fn(&Arc<Session>) + Send + Sync>;

#[derive(Default)]
struct Observers {
    connected: RwLock<Vec<SessionObserver>>,
    disconnected: RwLock<Vec<SessionObserver>>,
}

/// State shared by the accept loop and the session drivers.
struct NetShared {
    allow_duplicate_remotes: bool,
    nagle: bool,
    partial_frames: bool,
    max_frame: usize,
    propagator: Arc<dyn Propagator>,
    sink: Arc<FailureSink>,
    clients: Arc<Mutex<Vec<Arc<Session>>>>,
    observers: Arc<Observers>,
}

struct AcceptTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Accepting front-end of the node.
pub struct Server {
    runtime: Option<Runtime>,
    config: ServerConfig,
    /// Mutable override of `config.nagle`; read once per `start`.
    nagle: AtomicBool,
    propagator: Arc<dyn Propagator>,
    sink: Arc<FailureSink>,
    clients: Arc<Mutex<Vec<Arc<Session>>>>,
    observers: Arc<Observers>,
    accept: Mutex<Option<AcceptTask>>,
    running: AtomicBool,
}

impl Server {
    /// Build a server reporting transport faults to the global failure sink.
    pub fn new(propagator: Arc<dyn Propagator>, config: ServerConfig) -> ServerResult<Self> {
        Self::with_failure_sink(propagator, config, FailureSink::global())
    }

    /// Build a server with a caller-owned failure sink.
    pub fn with_failure_sink(
        propagator: Arc<dyn Propagator>,
        config: ServerConfig,
        sink: Arc<FailureSink>,
    ) -> ServerResult<Self> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .thread_name("hive-net-worker")
            .enable_all()
            .build()?;

        Ok(Self {
            runtime: Some(runtime),
            nagle: AtomicBool::new(config.nagle),
            config,
            propagator,
            sink,
            clients: Arc::new(Mutex::new(Vec::new())),
            observers: Arc::new(Observers::default()),
            accept: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Register a callback fired for each accepted session.
    pub fn on_client_connected<F>(&self, callback: F)
    where
        F: Fn(&Arc<Session>) + Send + Sync + 'static,
    {
        self.observers.connected.write().push(Box::new(callback));
    }

    /// Register a callback fired once per session after it leaves the live
    /// list.
    pub fn on_client_disconnected<F>(&self, callback: F)
    where
        F: Fn(&Arc<Session>) + Send + Sync + 'static,
    {
        self.observers.disconnected.write().push(Box::new(callback));
    }

    /// Toggle Nagle on accepted sockets. Takes effect on the next `start`.
    pub fn set_nagle(&self, enabled: bool) {
        self.nagle.store(enabled, Ordering::Release);
    }

    /// Number of live sessions.
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bind `addr:port` and start accepting. Returns the bound address,
    /// which differs from the request when `port` is zero.
    pub fn start(&self, addr: Ipv4Addr, port: u16) -> ServerResult<SocketAddr> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyRunning);
        }

        let runtime = self.runtime.as_ref().expect("runtime lives until drop");
        let backlog = self.config.backlog;
        let bound = runtime.block_on(async {
            let socket = TcpSocket::new_v4()?;
            socket.bind(SocketAddr::from((addr, port)))?;
            let listener = socket.listen(backlog)?;
            let local = listener.local_addr()?;
            Ok::<_, std::io::Error>((listener, local))
        });
        let (listener, local) = match bound {
            Ok(bound) => bound,
            Err(err) => {
                self.running.store(false, Ordering::Release);
                return Err(err.into());
            }
        };

        let shared = Arc::new(NetShared {
            allow_duplicate_remotes: self.config.allow_duplicate_remotes,
            nagle: self.nagle.load(Ordering::Acquire),
            partial_frames: self.config.partial_frames,
            max_frame: self.config.max_frame,
            propagator: Arc::clone(&self.propagator),
            sink: Arc::clone(&self.sink),
            clients: Arc::clone(&self.clients),
            observers: Arc::clone(&self.observers),
        });

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(accept_loop(listener, cancel.clone(), shared));
        *self.accept.lock() = Some(AcceptTask { cancel, handle });

        info!(target: "hive::server", %local, backlog, "server started");
        Ok(local)
    }

    /// Stop accepting and disconnect every live session.
    pub fn stop(&self) -> ServerResult<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(ServerError::NotRunning);
        }

        if let Some(task) = self.accept.lock().take() {
            task.cancel.cancel();
            let runtime = self.runtime.as_ref().expect("runtime lives until drop");
            let _ = runtime.block_on(task.handle);
        }

        let drained: Vec<_> = {
            let mut clients = self.clients.lock();
            clients.drain(..).collect()
        };
        for session in &drained {
            session.disconnect();
        }

        info!(target: "hive::server", disconnected = drained.len(), "server stopped");
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(5));
        }
    }
}

async fn accept_loop(listener: TcpListener, cancel: CancellationToken, shared: Arc<NetShared>) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target: "hive::server", "accept loop stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => admit(&shared, stream, remote),
                Err(err) => {
                    error!(target: "hive::server", error = %err, "accept failed, listener giving up");
                    shared
                        .sink
                        .record(FailureOrigin::Transport, format!("accept failed: {err}"));
                    break;
                }
            }
        }
    }
}

fn admit(shared: &Arc<NetShared>, stream: TcpStream, remote: SocketAddr) {
    if !shared.allow_duplicate_remotes {
        let clients = shared.clients.lock();
        if clients.iter().any(|c| c.remote().ip() == remote.ip()) {
            drop(clients);
            warn!(target: "hive::server", %remote, "rejecting duplicate connection from live remote");
            drop(stream);
            return;
        }
    }

    if let Err(err) = stream.set_nodelay(!shared.nagle) {
        debug!(target: "hive::server", %remote, error = %err, "set_nodelay failed");
    }

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let session = Arc::new(Session::new(remote, outbound_tx));
    session.grant(Capability::Connected);
    shared.clients.lock().push(Arc::clone(&session));
    for observer in shared.observers.connected.read().iter() {
        observer(&session);
    }
    info!(target: "hive::server", %remote, session = session.id(), "client connected");

    tokio::spawn(drive_session(Arc::clone(shared), session, stream, outbound_rx));
}

async fn drive_session(
    shared: Arc<NetShared>,
    session: Arc<Session>,
    stream: TcpStream,
    outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    let (read_half, write_half) = stream.into_split();
    let cancel = session.cancel_token().clone();

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = pump_inbound(&shared, &session, read_half) => {}
        _ = pump_outbound(&shared, write_half, outbound) => {}
    }

    if session.mark_disconnected() {
        shared.clients.lock().retain(|c| c.id() != session.id());
        for observer in shared.observers.disconnected.read().iter() {
            observer(&session);
        }
        info!(target: "hive::server", session = session.id(), remote = %session.remote(), "client disconnected");
    }
}

/// Receive loop. Decoded frames go straight to the propagator; the session
/// itself never interprets them.
async fn pump_inbound(shared: &Arc<NetShared>, session: &Arc<Session>, mut read_half: OwnedReadHalf) {
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut codec = FrameCodec::new(shared.max_frame);

    loop {
        if shared.partial_frames {
            if !buf.is_empty() {
                shared.propagator.propagate(session, buf.split().freeze());
            }
        } else {
            loop {
                match codec.decode(&mut buf) {
                    Ok(Some(frame)) => shared.propagator.propagate(session, frame),
                    Ok(None) => break,
                    Err(err) => {
                        shared
                            .sink
                            .record(FailureOrigin::Transport, format!("frame decode failed: {err}"));
                        return;
                    }
                }
            }
        }

        match read_half.read_buf(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) => {
                shared
                    .sink
                    .record(FailureOrigin::Transport, format!("receive failed: {err}"));
                return;
            }
        }
    }
}

/// Writer loop draining the session's outbound queue.
async fn pump_outbound(
    shared: &Arc<NetShared>,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    let mut codec = FrameCodec::new(shared.max_frame);
    let mut staging = BytesMut::new();

    while let Some(frame) = outbound.recv().await {
        if shared.partial_frames {
            staging.extend_from_slice(&frame);
        } else if let Err(err) = codec.encode(frame, &mut staging) {
            shared
                .sink
                .record(FailureOrigin::Transport, format!("frame encode failed: {err}"));
            return;
        }
        if write_half.write_all(&staging).await.is_err() {
            return;
        }
        staging.clear();
    }
}
