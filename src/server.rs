//! FastAGI listener: accepts TCP connections from Asterisk, runs the
//! environment handshake on each, and hands finished sessions to one consumer.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::{
    constants::DEFAULT_HANDOFF_QUEUE_SIZE,
    error::{AgiError, AgiResult},
    session::{AgiOptions, AgiSession},
};

/// Options for the FastAGI listener.
#[derive(Debug, Clone)]
pub struct FastAgiOptions {
    /// Applied to every accepted session.
    pub session: AgiOptions,
    /// Handshaken sessions waiting for the consumer. Default: 16, minimum 1.
    ///
    /// When full the accept loop blocks; Asterisk's connections queue up in
    /// the kernel backlog meanwhile.
    pub queue_size: usize,
}

impl Default for FastAgiOptions {
    fn default() -> Self {
        Self {
            session: AgiOptions::default(),
            queue_size: DEFAULT_HANDOFF_QUEUE_SIZE,
        }
    }
}

/// Listener status
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ListenerStatus {
    /// Accepting connections.
    Listening,
    /// Accept loop has exited.
    Stopped(StopReason),
}

/// Why the accept loop exited
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StopReason {
    /// [`FastAgiServer::shutdown`] was called
    ShutdownRequested,
    /// The [`SessionStream`] was dropped
    ConsumerDropped,
    /// The listening socket failed (io::Error is not Clone, so we store the message)
    AcceptFailed(String),
    /// The accept task panicked
    Panicked,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::ShutdownRequested => write!(f, "shutdown requested"),
            StopReason::ConsumerDropped => write!(f, "session consumer dropped"),
            StopReason::AcceptFailed(msg) => write!(f, "accept failed: {}", msg),
            StopReason::Panicked => write!(f, "accept task panicked"),
        }
    }
}

/// Source of incoming connections.
pub(crate) trait Accept: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn poll_accept(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<(Self::Stream, SocketAddr)>>;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    fn poll_accept(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        TcpListener::poll_accept(self, cx)
    }
}

/// Errors that concern one connection, not the listening socket.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

struct SharedState {
    shutdown: Notify,
    terminal_error: Mutex<Option<AgiError>>,
}

/// Handle to a running FastAGI listener (Clone + Send).
///
/// Sessions arrive on the paired [`SessionStream`]. Dropping this handle
/// does not stop the listener; call [`shutdown`](Self::shutdown) or drop
/// the stream.
#[derive(Clone)]
pub struct FastAgiServer {
    shared: Arc<SharedState>,
    status_rx: watch::Receiver<ListenerStatus>,
    local_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for FastAgiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastAgiServer")
            .field("local_addr", &self.local_addr)
            .field("status", &self.status())
            .finish()
    }
}

/// Handshaken sessions, in accept order (!Clone).
pub struct SessionStream<S = TcpStream> {
    rx: mpsc::Receiver<AgiSession<S>>,
    status_rx: watch::Receiver<ListenerStatus>,
}

impl<S> std::fmt::Debug for SessionStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStream")
            .field("listening", &self.is_listening())
            .finish()
    }
}

/// Accept loop with panic containment
async fn accept_loop<A: Accept>(
    acceptor: A,
    options: AgiOptions,
    shared: Arc<SharedState>,
    status_tx: watch::Sender<ListenerStatus>,
    session_tx: mpsc::Sender<AgiSession<A::Stream>>,
) {
    let result = std::panic::AssertUnwindSafe(accept_loop_inner(
        acceptor,
        options,
        shared.clone(),
        session_tx,
    ));
    let reason = match futures_util::FutureExt::catch_unwind(result).await {
        Ok(reason) => reason,
        Err(_) => {
            error!("accept task panicked");
            *shared
                .terminal_error
                .lock()
                .await = Some(AgiError::ListenerFailed {
                message: "accept task panicked".to_string(),
            });
            StopReason::Panicked
        }
    };
    info!("FastAGI listener stopped: {}", reason);
    status_tx.send_replace(ListenerStatus::Stopped(reason));
}

async fn accept_loop_inner<A: Accept>(
    mut acceptor: A,
    options: AgiOptions,
    shared: Arc<SharedState>,
    session_tx: mpsc::Sender<AgiSession<A::Stream>>,
) -> StopReason {
    loop {
        let accepted = tokio::select! {
            _ = shared.shutdown.notified() => return StopReason::ShutdownRequested,
            _ = session_tx.closed() => return StopReason::ConsumerDropped,
            r = poll_fn(|cx| acceptor.poll_accept(cx)) => r,
        };

        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) if is_transient(&e) => {
                warn!("[ACCEPT] Transient accept error: {}", e);
                continue;
            }
            Err(e) => {
                error!("[ACCEPT] Listener failed: {}", e);
                let reason = StopReason::AcceptFailed(e.to_string());
                *shared
                    .terminal_error
                    .lock()
                    .await = Some(AgiError::ListenerFailed {
                    message: e.to_string(),
                });
                return reason;
            }
        };
        debug!("[ACCEPT] Connection from {}", addr);

        let handshake = tokio::select! {
            _ = shared.shutdown.notified() => return StopReason::ShutdownRequested,
            r = AgiSession::handshake(stream, &options) => r,
        };
        let session = match handshake {
            Ok(session) => session.with_peer_addr(addr),
            Err(e) => {
                // the stream was moved into the failed handshake and is closed with it
                warn!("[ACCEPT] Handshake with {} failed: {}", addr, e);
                continue;
            }
        };
        info!(
            "[ACCEPT] Session from {} for {}",
            addr,
            session
                .env("request")
                .unwrap_or("?")
        );

        tokio::select! {
            _ = shared.shutdown.notified() => return StopReason::ShutdownRequested,
            r = session_tx.send(session) => {
                if r.is_err() {
                    return StopReason::ConsumerDropped;
                }
            }
        }
    }
}

impl FastAgiServer {
    /// Bind a TCP listener and start accepting.
    ///
    /// ```rust,no_run
    /// use asterisk_agi_tokio::{FastAgiOptions, FastAgiServer};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), asterisk_agi_tokio::AgiError> {
    ///     let (_server, mut sessions) =
    ///         FastAgiServer::bind("0.0.0.0:4573", FastAgiOptions::default()).await?;
    ///     while let Some(mut agi) = sessions.recv().await {
    ///         tokio::spawn(async move {
    ///             let _ = agi.answer().await;
    ///             let _ = agi.stream_file("hello-world", "").await;
    ///             let _ = agi.hangup(None).await;
    ///         });
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn bind(
        addr: impl ToSocketAddrs,
        options: FastAgiOptions,
    ) -> AgiResult<(Self, SessionStream)> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(AgiError::Io)?;
        Ok(Self::from_listener(listener, options))
    }

    /// Start accepting on an already bound listener. Must be called within
    /// a tokio runtime.
    pub fn from_listener(listener: TcpListener, options: FastAgiOptions) -> (Self, SessionStream) {
        let local_addr = listener
            .local_addr()
            .ok();
        match local_addr {
            Some(addr) => info!("FastAGI listening on {}", addr),
            None => info!("FastAGI listening"),
        }
        let (mut server, sessions) = Self::spawn(listener, options);
        server.local_addr = local_addr;
        (server, sessions)
    }

    pub(crate) fn spawn<A: Accept>(
        acceptor: A,
        options: FastAgiOptions,
    ) -> (Self, SessionStream<A::Stream>) {
        let queue_size = options
            .queue_size
            .max(1);

        let shared = Arc::new(SharedState {
            shutdown: Notify::new(),
            terminal_error: Mutex::new(None),
        });

        let (status_tx, status_rx) = watch::channel(ListenerStatus::Listening);
        let status_rx2 = status_tx.subscribe();
        let (session_tx, session_rx) = mpsc::channel(queue_size);

        tokio::spawn(accept_loop(
            acceptor,
            options.session,
            shared.clone(),
            status_tx,
            session_tx,
        ));

        let server = FastAgiServer {
            shared,
            status_rx,
            local_addr: None,
        };
        let sessions = SessionStream {
            rx: session_rx,
            status_rx: status_rx2,
        };
        (server, sessions)
    }

    /// Bound address, for listeners created from a TCP socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Current listener status snapshot.
    pub fn status(&self) -> ListenerStatus {
        self.status_rx
            .borrow()
            .clone()
    }

    /// Whether the accept loop is still running.
    pub fn is_listening(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ListenerStatus::Listening
        )
    }

    /// Stop accepting. Sessions already handed off are unaffected.
    pub fn shutdown(&self) {
        info!("FastAGI shutdown requested");
        self.shared
            .shutdown
            .notify_one();
    }

    /// Wait for the accept loop to exit and take its terminal error.
    ///
    /// The error is handed out once; later calls, and stops without an
    /// error (shutdown, consumer dropped), return `None`.
    pub async fn terminated(&self) -> Option<AgiError> {
        let mut status_rx = self
            .status_rx
            .clone();
        // sender is only dropped after publishing Stopped
        let _ = status_rx
            .wait_for(|s| matches!(s, ListenerStatus::Stopped(_)))
            .await;
        self.shared
            .terminal_error
            .lock()
            .await
            .take()
    }
}

impl<S> SessionStream<S> {
    /// Next handshaken session, or `None` once the listener has stopped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<AgiSession<S>> {
        self.rx
            .recv()
            .await
    }

    /// Whether the accept loop is still running.
    pub fn is_listening(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ListenerStatus::Listening
        )
    }

    /// Current listener status snapshot.
    pub fn status(&self) -> ListenerStatus {
        self.status_rx
            .borrow()
            .clone()
    }
}

impl<S> futures_util::Stream for SessionStream<S> {
    type Item = AgiSession<S>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}
