//! Local-to-remote port tunnel to the metrics backend
//!
//! `open_tunnel` reserves an ephemeral local port, hands the forwarding loop
//! to a background task and blocks until that task reports readiness. The
//! returned `Tunnel` owns the local port until it is closed or dropped.
//!
//! Lifecycle: `Idle -> Dialing -> AwaitingReady -> Ready -> Forwarding`,
//! ending in `Failed` (setup or fatal I/O error) or `Stopped` (caller stop).

mod portforward;

pub use portforward::KubePortForwarder;

use crate::observability::Diagnostics;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

pub use async_trait::async_trait;

/// Default metrics backend port inside the pod
pub const DEFAULT_REMOTE_PORT: u16 = 9090;

/// Pause after running out of file descriptors before accepting again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// EMFILE and ENFILE on Linux and macOS
const FD_EXHAUSTION_CODES: [i32; 2] = [24, 23];

/// Fatal tunnel setup errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("could not reserve a local port: {0}")]
    PortAllocation(#[source] std::io::Error),

    #[error("port-forward to {target} failed: {message}")]
    Dial { target: String, message: String },

    #[error("port-forward did not provide a stream for port {0}")]
    MissingStream(u16),

    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("forwarding task exited before signalling readiness")]
    ReadyDropped,
}

/// Bidirectional byte stream to the remote port
pub trait ForwardStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ForwardStream for T {}

/// Opens upgraded streams to a port inside the target pod
#[async_trait]
pub trait PortForwarder: Send + Sync + 'static {
    /// Human-readable target, used in errors and logs
    fn target(&self) -> String;

    /// Dial a fresh stream to `remote_port`
    async fn dial(&self, remote_port: u16) -> Result<Box<dyn ForwardStream>, TunnelError>;
}

/// Observable tunnel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Dialing,
    AwaitingReady,
    Ready,
    Forwarding,
    Failed,
    Stopped,
}

impl TunnelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TunnelState::Failed | TunnelState::Stopped)
    }
}

/// A ready tunnel. Dropping it stops the forwarding task.
pub struct Tunnel {
    local_addr: SocketAddr,
    remote_port: u16,
    state: watch::Receiver<TunnelState>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Tunnel {
    /// Locally reachable address forwarding to the remote port
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// `http://127.0.0.1:<port>` for HTTP clients
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// Signal the forwarding task to stop and wait until it has released the port
    pub async fn close(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Forwarding task ended abnormally");
            }
        }
    }

    fn signal_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Reserve an ephemeral port by binding and immediately releasing a listener
pub fn free_local_port() -> Result<u16, TunnelError> {
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(TunnelError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(TunnelError::PortAllocation)?
        .port();
    Ok(port)
}

/// Open a tunnel to `remote_port` and wait for it to become ready.
///
/// No address is handed out before the forwarding task signals readiness.
/// A failed dial or bind returns an error and leaves nothing running.
pub async fn open_tunnel<F: PortForwarder>(
    forwarder: F,
    remote_port: u16,
    diagnostics: Arc<Diagnostics>,
) -> Result<Tunnel, TunnelError> {
    let port = free_local_port()?;
    let local_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    let (state_tx, state_rx) = watch::channel(TunnelState::Idle);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    let forwarder = Arc::new(forwarder);
    let task = tokio::spawn(forward_loop(
        forwarder,
        local_addr,
        remote_port,
        state_tx,
        ready_tx,
        stop_rx,
    ));

    let ready = match ready_rx.await {
        Ok(result) => result,
        Err(_) => Err(TunnelError::ReadyDropped),
    };

    if let Err(e) = ready {
        diagnostics.log_tunnel_failed(&e);
        let _ = task.await;
        return Err(e);
    }

    diagnostics.log_tunnel_ready(&local_addr.to_string(), remote_port);

    Ok(Tunnel {
        local_addr,
        remote_port,
        state: state_rx,
        stop_tx: Some(stop_tx),
        task: Some(task),
    })
}

async fn forward_loop<F: PortForwarder>(
    forwarder: Arc<F>,
    local_addr: SocketAddr,
    remote_port: u16,
    state: watch::Sender<TunnelState>,
    ready: oneshot::Sender<Result<(), TunnelError>>,
    mut stop: oneshot::Receiver<()>,
) {
    state.send_replace(TunnelState::Dialing);
    info!(target_pod = %forwarder.target(), remote_port, "Connecting port-forward");

    // Probe the upgrade once so a bad target fails the handshake instead of
    // the first proxied connection.
    match forwarder.dial(remote_port).await {
        Ok(probe) => drop(probe),
        Err(e) => {
            state.send_replace(TunnelState::Failed);
            let _ = ready.send(Err(e));
            return;
        }
    }

    state.send_replace(TunnelState::AwaitingReady);
    let listener = match TcpListener::bind(local_addr).await {
        Ok(listener) => listener,
        Err(source) => {
            state.send_replace(TunnelState::Failed);
            let _ = ready.send(Err(TunnelError::Bind {
                addr: local_addr,
                source,
            }));
            return;
        }
    };

    state.send_replace(TunnelState::Ready);
    if ready.send(Ok(())).is_err() {
        // Caller went away while waiting; nobody can use the address.
        state.send_replace(TunnelState::Stopped);
        return;
    }

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(%local_addr, "Stop signal received");
                state.send_replace(TunnelState::Stopped);
                break;
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    state.send_replace(TunnelState::Forwarding);
                    let forwarder = forwarder.clone();
                    connections.spawn(proxy_connection(forwarder, conn, peer, remote_port));
                }
                Err(e) if is_transient_accept_error(&e) => {
                    warn!(error = %e, %local_addr, "Accept failed, retrying");
                    if is_fd_exhaustion(&e) {
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, %local_addr, "Accept failed, closing tunnel");
                    state.send_replace(TunnelState::Failed);
                    break;
                }
            }
        }
    }

    // Open connections hold upstream streams; they must not outlive the tunnel.
    if !connections.is_empty() {
        debug!(open = connections.len(), %local_addr, "Aborting open connections");
    }
    connections.shutdown().await;
}

/// Errors that concern a single pending connection, not the listener
fn is_transient_accept_error(e: &io::Error) -> bool {
    is_fd_exhaustion(e)
        || matches!(
            e.kind(),
            io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut
        )
}

fn is_fd_exhaustion(e: &io::Error) -> bool {
    e.raw_os_error()
        .is_some_and(|code| FD_EXHAUSTION_CODES.contains(&code))
}

async fn proxy_connection<F: PortForwarder>(
    forwarder: Arc<F>,
    mut conn: TcpStream,
    peer: SocketAddr,
    remote_port: u16,
) {
    let mut upstream = match forwarder.dial(remote_port).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(error = %e, %peer, "Could not open upstream stream");
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut conn, &mut upstream).await {
        Ok((sent, received)) => debug!(%peer, sent, received, "Connection closed"),
        Err(e) => debug!(error = %e, %peer, "Connection ended with error"),
    }
}
