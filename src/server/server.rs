//! High-level HAG1 server API.
//!
//! Provides [`HagServer`]: a TCP accept loop, one receive task per
//! connection, and the handshake/routing glue between them. Listeners on
//! the server's [`CallbackHub`] observe frames addressed to the server
//! itself (destination user 0) plus the log sink.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, tcp::OwnedReadHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::router::{route_frame, send_from_server};
use super::session::{Session, SessionManager};
use crate::callbacks::CallbackHub;
use crate::core::{DEFAULT_MAX_PAYLOAD_SIZE, HANDSHAKE_PREFIX, WELCOME_MESSAGE};
use crate::transport::{Frame, PayloadType, TransportError, TransportResult, recv_frame};

/// Errors that can occur in the HAG1 server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the requested port.
    #[error("bind failed: {0}")]
    BindFailed(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Receive-side payload ceiling; oversized frames close the connection.
    pub max_payload_size: usize,

    /// Close a connection that stays silent this long. `None` = never.
    pub idle_timeout: Option<Duration>,

    /// Give up on a single fan-out send after this long. `None` = never.
    pub send_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            idle_timeout: None,
            send_timeout: None,
        }
    }
}

/// Builder for creating a [`HagServer`].
#[derive(Debug, Default)]
pub struct HagServerBuilder {
    config: ServerConfig,
}

impl HagServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receive-side payload ceiling.
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the idle-connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Set the per-recipient send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = Some(timeout);
        self
    }

    /// Build the server.
    pub fn build(self) -> HagServer {
        HagServer::new(self.config)
    }
}

/// A HAG1 message-routing server.
///
/// # Example
///
/// ```ignore
/// use hag_protocol::server::HagServer;
///
/// let server = HagServer::builder().build();
/// server.hub().add_log_message_listener(|msg| println!("[server] {msg}"));
/// let addr = server.start(18888).await?;
///
/// // ... clients connect, frames route ...
///
/// server.stop().await;
/// ```
pub struct HagServer {
    /// Display name, surfaced in nothing but the owner's own logging.
    name: Mutex<String>,

    config: ServerConfig,

    hub: Arc<CallbackHub>,

    manager: Arc<SessionManager>,

    /// Shutdown signal observed by the accept loop and every session task.
    shutdown_tx: watch::Sender<bool>,

    accept_task: Mutex<Option<JoinHandle<()>>>,

    local_addr: Mutex<Option<SocketAddr>>,
}

impl HagServer {
    /// Create a server with the given configuration. Nothing is bound until
    /// [`HagServer::start`].
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            name: Mutex::new(String::new()),
            config,
            hub: Arc::new(CallbackHub::new()),
            manager: Arc::new(SessionManager::new()),
            shutdown_tx,
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Start building a server.
    pub fn builder() -> HagServerBuilder {
        HagServerBuilder::new()
    }

    /// The server's callback hub; register listeners here before `start`.
    pub fn hub(&self) -> &CallbackHub {
        &self.hub
    }

    /// The live session table.
    pub fn sessions(&self) -> &SessionManager {
        &self.manager
    }

    /// Display name.
    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    /// Set the display name.
    pub fn set_name(&self, name: impl Into<String>) {
        *lock(&self.name) = name.into();
    }

    /// Address the server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    /// Bind `0.0.0.0:<port>` and start accepting connections.
    ///
    /// Returns the bound address (useful with port 0). Calling `start` on a
    /// server that is already running just returns the existing address.
    pub async fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        if let Some(addr) = self.local_addr() {
            if lock(&self.accept_task).is_some() {
                return Ok(addr);
            }
        }

        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| ServerError::BindFailed(e.to_string()))?;
        let addr = listener.local_addr()?;
        *lock(&self.local_addr) = Some(addr);

        info!(%addr, "server started");
        self.hub.raise_log_message(&format!("server started: {addr}"));

        let manager = Arc::clone(&self.manager);
        let hub = Arc::clone(&self.hub);
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let task = tokio::spawn(accept_loop(listener, manager, hub, config, shutdown_rx));
        *lock(&self.accept_task) = Some(task);

        Ok(addr)
    }

    /// Deliver an owner-initiated frame per the destination fields: a
    /// specific user's sessions, a specific group, or every live session.
    pub async fn send_data(&self, frame: Frame) {
        send_from_server(&self.manager, &self.hub, &frame, self.config.send_timeout).await;
    }

    /// Stop accepting, close every live session, and wait for the accept
    /// loop to exit. Terminal: a stopped server is not restarted.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        let task = lock(&self.accept_task).take();
        if let Some(task) = task {
            let _ = task.await;
        }

        for session in self.manager.snapshot_all() {
            let id = session.session_id();
            if let Some(session) = self.manager.destroy(id) {
                session.close().await;
            }
        }

        info!("server stopped");
        self.hub.raise_log_message("server stopped");
    }
}

impl Default for HagServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Drop for HagServer {
    fn drop(&mut self) {
        // Wake the accept loop and session tasks if stop() was never called.
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for HagServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HagServer")
            .field("name", &self.name())
            .field("local_addr", &self.local_addr())
            .field("sessions", &self.manager.len())
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: TcpListener,
    manager: Arc<SessionManager>,
    hub: Arc<CallbackHub>,
    config: ServerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let connection = handle_connection(
                        stream,
                        addr,
                        Arc::clone(&manager),
                        Arc::clone(&hub),
                        config.clone(),
                        shutdown_rx.clone(),
                    );
                    tokio::spawn(connection);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            },
        }
    }
    debug!("accept loop exited");
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    manager: Arc<SessionManager>,
    hub: Arc<CallbackHub>,
    config: ServerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (mut reader, writer) = stream.into_split();
    let session = manager.create(Box::new(writer));
    let session_id = session.session_id();
    info!(%addr, session_id, "client connected");
    hub.raise_log_message(&format!("client connected: {addr}, session {session_id}"));

    let welcome = Frame::text(WELCOME_MESSAGE).with_destination(0, 0).with_source(0, 0);
    match session.send(&welcome).await {
        Ok(()) => {
            receive_loop(&mut reader, &session, &manager, &hub, &config, &mut shutdown_rx).await;
        }
        Err(e) => {
            warn!(session_id, error = %e, "failed to send welcome frame");
        }
    }

    if let Some(session) = manager.destroy(session_id) {
        session.close().await;
    }
    info!(%addr, session_id, "client disconnected");
    hub.raise_log_message(&format!("client disconnected: {addr}, session {session_id}"));
}

async fn receive_loop(
    reader: &mut OwnedReadHalf,
    session: &Arc<Session>,
    manager: &SessionManager,
    hub: &CallbackHub,
    config: &ServerConfig,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let session_id = session.session_id();
    loop {
        let received = tokio::select! {
            _ = shutdown_rx.changed() => break,
            received = recv_with_idle(reader, config) => received,
        };
        match received {
            Ok(Some(frame)) => {
                apply_handshake(manager, hub, session, &frame);
                route_frame(manager, hub, session, frame, config.send_timeout).await;
            }
            Ok(None) => {
                debug!(session_id, "peer closed the connection");
                break;
            }
            Err(e) => {
                warn!(session_id, error = %e, "receive failed, closing connection");
                break;
            }
        }
    }
}

async fn recv_with_idle(
    reader: &mut OwnedReadHalf,
    config: &ServerConfig,
) -> TransportResult<Option<Frame>> {
    match config.idle_timeout {
        Some(limit) => {
            match tokio::time::timeout(limit, recv_frame(reader, config.max_payload_size)).await {
                Ok(received) => received,
                Err(_) => Err(TransportError::Timeout),
            }
        }
        None => recv_frame(reader, config.max_payload_size).await,
    }
}

/// Inspect a frame for the `CONNECT:<u>:<g>` identity claim and apply it.
///
/// Parse failures are logged and leave the identity unchanged; the frame
/// still goes through normal routing either way (where the dispatch rule
/// keeps it away from text listeners).
fn apply_handshake(
    manager: &SessionManager,
    hub: &CallbackHub,
    session: &Session,
    frame: &Frame,
) {
    if frame.payload_type != PayloadType::PlainText {
        return;
    }
    let body = frame.to_text();
    if !body.starts_with(HANDSHAKE_PREFIX) {
        return;
    }
    let session_id = session.session_id();
    match parse_handshake(&body) {
        Ok((user_id, group_id)) => {
            manager.set_identity(session_id, user_id, group_id);
            info!(session_id, user_id, group_id, "handshake applied");
        }
        Err(e) => {
            warn!(session_id, error = %e, "ignoring malformed handshake");
            hub.raise_log_message(&format!(
                "invalid handshake from session {session_id}: {e}"
            ));
        }
    }
}

/// Why a `CONNECT:` body was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
enum HandshakeError {
    /// A colon-separated field was missing.
    #[error("expected CONNECT:<user>:<group>")]
    MissingField,

    /// A field was not a decimal u32.
    #[error("not a decimal u32: {0:?}")]
    BadNumber(String),

    /// More fields followed the group id.
    #[error("trailing fields after the group id")]
    TrailingFields,
}

/// Parse `CONNECT:<u>:<g>` into (user_id, group_id), strictly.
fn parse_handshake(body: &str) -> Result<(u32, u32), HandshakeError> {
    let rest = body.strip_prefix(HANDSHAKE_PREFIX).unwrap_or(body);
    let mut fields = rest.split(':');
    let user_id = parse_field(fields.next())?;
    let group_id = parse_field(fields.next())?;
    if fields.next().is_some() {
        return Err(HandshakeError::TrailingFields);
    }
    Ok((user_id, group_id))
}

fn parse_field(field: Option<&str>) -> Result<u32, HandshakeError> {
    let field = field.ok_or(HandshakeError::MissingField)?;
    field
        .parse::<u32>()
        .map_err(|_| HandshakeError::BadNumber(field.to_owned()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
