//! High-level HAG1 client API.
//!
//! Provides [`HagClient`]: connect, claim an identity via the `CONNECT:`
//! handshake, and run a receive loop that feeds decoded frames to the local
//! [`CallbackHub`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callbacks::{CallbackHub, dispatch_frame};
use crate::core::{
    DEFAULT_HANDSHAKE_DELAY, DEFAULT_MAX_PAYLOAD_SIZE, HANDSHAKE_PREFIX, WELCOME_PREFIX,
    WILDCARD_ID,
};
use crate::transport::{Frame, PayloadType, TransportError, recv_frame, send_frame};

/// Errors that can occur in the HAG1 client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to reach the server.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A send was attempted while disconnected.
    #[error("not connected")]
    NotConnected,

    /// Transport failure on an established connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Settle delay between connecting and sending the handshake, for
    /// servers that are not reading yet. Zero is fine against a live server.
    pub handshake_delay: Duration,

    /// Receive-side payload ceiling.
    pub max_payload_size: usize,

    /// Give up on a send after this long. `None` = never.
    pub send_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_delay: DEFAULT_HANDSHAKE_DELAY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            send_timeout: None,
        }
    }
}

/// Builder for creating a [`HagClient`].
#[derive(Debug, Default)]
pub struct HagClientBuilder {
    config: ClientConfig,
}

impl HagClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pre-handshake settle delay.
    pub fn handshake_delay(mut self, delay: Duration) -> Self {
        self.config.handshake_delay = delay;
        self
    }

    /// Set the receive-side payload ceiling.
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> HagClient {
        HagClient::new(self.config)
    }
}

/// A HAG1 protocol client.
///
/// # Example
///
/// ```ignore
/// use hag_protocol::client::HagClient;
/// use hag_protocol::transport::Frame;
///
/// let client = HagClient::builder().build();
/// client.hub().add_text_listener(|message, frame| {
///     println!("from user {}: {message}", frame.src_user_id);
/// });
///
/// client.connect("127.0.0.1", 18888, 100, 1).await?;
/// client.send_data(Frame::text("hello").with_destination(0xFFFF, 0xFFFF)).await?;
/// client.disconnect();
/// ```
pub struct HagClient {
    /// Display name, for the owner's own logging.
    name: Mutex<String>,

    config: ClientConfig,

    hub: Arc<CallbackHub>,

    user_id: AtomicU32,
    group_id: AtomicU32,

    /// Cleared on disconnect, by either side.
    alive: Arc<AtomicBool>,

    /// Write half, behind an async mutex so sends never interleave.
    writer: Mutex<Option<Arc<tokio::sync::Mutex<OwnedWriteHalf>>>>,

    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl HagClient {
    /// Create a client with the given configuration; call
    /// [`HagClient::connect`] to go live.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            name: Mutex::new(String::new()),
            config,
            hub: Arc::new(CallbackHub::new()),
            user_id: AtomicU32::new(0),
            group_id: AtomicU32::new(0),
            alive: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(None),
            recv_task: Mutex::new(None),
        }
    }

    /// Start building a client.
    pub fn builder() -> HagClientBuilder {
        HagClientBuilder::new()
    }

    /// The client's callback hub; register listeners here before `connect`.
    pub fn hub(&self) -> &CallbackHub {
        &self.hub
    }

    /// Display name.
    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    /// Set the display name.
    pub fn set_name(&self, name: impl Into<String>) {
        *lock(&self.name) = name.into();
    }

    /// Claimed user id (0 before the first connect).
    pub fn user_id(&self) -> u32 {
        self.user_id.load(Ordering::SeqCst)
    }

    /// Claimed group id (0 before the first connect).
    pub fn group_id(&self) -> u32 {
        self.group_id.load(Ordering::SeqCst)
    }

    /// True while connected.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Connect, claim (user_id, group_id), and start the receive loop.
    ///
    /// Ids 0 and 0xFFFF are reserved by the protocol (server and wildcard)
    /// and must not be claimed.
    ///
    /// A client that is already connected returns immediately.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        user_id: u32,
        group_id: u32,
    ) -> Result<(), ClientError> {
        if self.is_alive() {
            return Ok(());
        }

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        let (reader, writer) = stream.into_split();

        self.user_id.store(user_id, Ordering::SeqCst);
        self.group_id.store(group_id, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        *lock(&self.writer) = Some(Arc::clone(&writer));

        if !self.config.handshake_delay.is_zero() {
            tokio::time::sleep(self.config.handshake_delay).await;
        }

        let handshake = Frame::text(&format!("{HANDSHAKE_PREFIX}{user_id}:{group_id}"))
            .with_destination(0, 0)
            .with_source(group_id, user_id);
        {
            let mut w = writer.lock().await;
            if let Err(e) = send_frame(&mut *w, &handshake).await {
                warn!(error = %e, "handshake send failed");
                drop(w);
                self.disconnect();
                return Err(e.into());
            }
        }

        let task = tokio::spawn(receive_loop(
            reader,
            Arc::clone(&self.hub),
            Arc::clone(&self.alive),
            self.config.max_payload_size,
        ));
        *lock(&self.recv_task) = Some(task);

        info!(host, port, user_id, group_id, "connected");
        self.hub.raise_log_message(&format!("connected to {host}:{port}"));
        Ok(())
    }

    /// Send a frame to the server for routing.
    ///
    /// A zero source group is filled with the client's group id, a wildcard
    /// source user with the client's user id, so fresh frames carry the
    /// caller's identity without ceremony.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] when disconnected; on transport
    /// failure the client disconnects and the error propagates.
    pub async fn send_data(&self, mut frame: Frame) -> Result<(), ClientError> {
        if !self.is_alive() {
            return Err(ClientError::NotConnected);
        }
        let writer = lock(&self.writer).clone().ok_or(ClientError::NotConnected)?;

        if frame.src_group_id == 0 {
            frame.src_group_id = self.group_id();
        }
        if frame.src_user_id == WILDCARD_ID {
            frame.src_user_id = self.user_id();
        }

        let result = {
            let mut w = writer.lock().await;
            match self.config.send_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, send_frame(&mut *w, &frame)).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout),
                    }
                }
                None => send_frame(&mut *w, &frame).await,
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "send failed, disconnecting");
            self.hub.raise_log_message(&format!("send failed: {e}"));
            self.disconnect();
            return Err(e.into());
        }
        Ok(())
    }

    /// Cancel the receive loop, close the connection, and mark the client
    /// dead. Idempotent.
    pub fn disconnect(&self) {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);

        if let Some(task) = lock(&self.recv_task).take() {
            task.abort();
        }
        // Dropping the write half closes our side of the connection.
        lock(&self.writer).take();

        if was_alive {
            info!("disconnected");
            self.hub.raise_log_message("disconnected from server");
        }
    }
}

impl Default for HagClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Drop for HagClient {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.recv_task).take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for HagClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HagClient")
            .field("name", &self.name())
            .field("user_id", &self.user_id())
            .field("group_id", &self.group_id())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Receive frames until the server goes away, feeding the local hub.
async fn receive_loop(
    mut reader: OwnedReadHalf,
    hub: Arc<CallbackHub>,
    alive: Arc<AtomicBool>,
    max_payload_size: usize,
) {
    let mut greeted = false;
    loop {
        match recv_frame(&mut reader, max_payload_size).await {
            Ok(Some(frame)) => {
                if !greeted && is_welcome(&frame) {
                    greeted = true;
                    debug!("received server greeting");
                    hub.raise_first_message(&frame.to_text());
                }
                dispatch_frame(&hub, &frame);
            }
            Ok(None) => {
                debug!("server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "receive failed");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    hub.raise_log_message("connection closed");
}

fn is_welcome(frame: &Frame) -> bool {
    frame.payload_type == PayloadType::PlainText && frame.to_text().starts_with(WELCOME_PREFIX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
