//! Reconnecting frame streaming client
//!
//! One logical connection to the receiver. The client never retries in a
//! loop: a send that finds no live connection drops its frame and schedules
//! a single background reconnect, so the next admitted frame goes out on
//! the fresh connection.
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──ok──> Connected
//!       ^                          │                 │
//!       │                          └──err──> Failed  │
//!       └──────── write error / close() ─────────────┘
//! ```

use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, trace, warn};

use super::codec;
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::video::RateGate;
use crate::{error_throttled, warn_throttled};

/// Opens transport streams to the receiver
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncWrite + Send + Unpin + 'static;

    /// Open a new stream
    async fn connect(&self) -> io::Result<Self::Stream>;

    /// Whether an existing stream is still usable
    fn is_alive(&self, stream: &Self::Stream) -> bool;

    /// Human readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// TCP transport
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: None,
        }
    }

    /// Bound each connect attempt; `None` waits for the OS timeout
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let addr = (self.host.as_str(), self.port);
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
            None => TcpStream::connect(addr).await?,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        Ok(stream)
    }

    fn is_alive(&self, stream: &TcpStream) -> bool {
        if stream.peer_addr().is_err() || !matches!(stream.take_error(), Ok(None)) {
            return false;
        }
        // The receiver never writes, so a readable socket means EOF or reset
        let mut peek = [0u8; 1];
        match stream.try_read(&mut peek) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) => e.kind() == io::ErrorKind::WouldBlock,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream
    Disconnected,
    /// Connect attempt in progress
    Connecting,
    /// Handshake written, frames can be sent
    Connected,
    /// Last connect attempt failed; behaves like `Disconnected`
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a frame was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No live connection; a reconnect was scheduled
    NotConnected,
    /// The write failed and the connection was torn down
    WriteFailed,
    /// Payload does not fit the length prefix
    Oversized,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::NotConnected => write!(f, "not connected"),
            DropReason::WriteFailed => write!(f, "write failed"),
            DropReason::Oversized => write!(f, "oversized"),
        }
    }
}

/// Result of a single send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame written; `bytes` includes the length prefix
    Sent { bytes: usize },
    Dropped(DropReason),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Client statistics
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    pub connect_attempts: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_dropped: u64,
}

struct Shared<C: Connector> {
    connector: C,
    endpoint: String,
    /// Held across connect, send and close
    conn: Mutex<Option<BufWriter<C::Stream>>>,
    state: watch::Sender<ConnectionState>,
    /// Bumped by close() so stale scheduled reconnects become no-ops
    generation: AtomicU64,
    reconnect_pending: AtomicBool,
    reconnect_gate: RateGate,
    epoch: Instant,
    connect_attempts: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_dropped: AtomicU64,
    throttler: LogThrottler,
}

impl<C: Connector> Shared<C> {
    fn set_state(&self, new: ConnectionState) {
        let old = self.state.send_replace(new);
        if old != new {
            debug!("Connection state: {} -> {}", old, new);
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn dropped(&self, reason: DropReason) -> SendOutcome {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        SendOutcome::Dropped(reason)
    }

    /// Connect unless a live stream exists
    ///
    /// With `generation` set the attempt is skipped if `close()` ran since
    /// it was scheduled.
    async fn connect(&self, generation: Option<u64>) -> Result<()> {
        let mut conn = self.conn.lock().await;

        if generation.is_some_and(|g| g != self.generation.load(Ordering::Acquire)) {
            trace!("Skipping reconnect scheduled before close");
            return Ok(());
        }

        if let Some(writer) = conn.as_ref() {
            if self.connector.is_alive(writer.get_ref()) {
                return Ok(());
            }
            debug!("Discarding dead connection to {}", self.endpoint);
        }
        if let Some(mut stale) = conn.take() {
            let _ = stale.shutdown().await;
        }

        self.set_state(ConnectionState::Connecting);
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);

        match self.open().await {
            Ok(writer) => {
                *conn = Some(writer);
                self.set_state(ConnectionState::Connected);
                self.throttler.clear("connect_failed");
                self.throttler.clear("send_failed");
                info!("Connected to {}", self.endpoint);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Failed);
                error_throttled!(
                    self.throttler,
                    "connect_failed",
                    "Failed to connect to {}: {}",
                    self.endpoint,
                    e
                );
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<BufWriter<C::Stream>> {
        let stream = self
            .connector
            .connect()
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;

        let mut writer = BufWriter::new(stream);
        if let Err(e) = codec::write_handshake(&mut writer).await {
            let _ = writer.shutdown().await;
            return Err(AppError::Handshake(e.to_string()));
        }
        Ok(writer)
    }

    /// Schedule one background connect; no-op while one is in flight
    fn request_reconnect(self: &Arc<Self>) {
        if self
            .reconnect_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if !self.reconnect_gate.admit(self.now_ms()) {
            self.reconnect_pending.store(false, Ordering::Release);
            trace!("Reconnect deferred by interval");
            return;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let shared = self.clone();
        tokio::spawn(async move {
            // failure is already logged and reflected in the state
            let _ = shared.connect(Some(generation)).await;
            shared.reconnect_pending.store(false, Ordering::Release);
        });
    }
}

/// Streaming client (cheap to clone, clones share the connection)
pub struct StreamingClient<C: Connector = TcpConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for StreamingClient<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl StreamingClient<TcpConnector> {
    /// TCP client for `host:port`
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(TcpConnector::new(host, port), Duration::ZERO)
    }
}

impl<C: Connector> StreamingClient<C> {
    /// Create a disconnected client
    ///
    /// `reconnect_interval` is the minimum time between scheduled
    /// reconnects; zero reconnects on every failed send.
    pub fn new(connector: C, reconnect_interval: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let endpoint = connector.endpoint();
        Self {
            shared: Arc::new(Shared {
                connector,
                endpoint,
                conn: Mutex::new(None),
                state,
                generation: AtomicU64::new(0),
                reconnect_pending: AtomicBool::new(false),
                reconnect_gate: RateGate::with_interval(reconnect_interval),
                epoch: Instant::now(),
                connect_attempts: AtomicU64::new(0),
                frames_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
                throttler: LogThrottler::default(),
            }),
        }
    }

    /// Receiver endpoint
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Open the connection and write the handshake
    ///
    /// Returns immediately when a live connection already exists. On error
    /// no stream is kept and the next send schedules a reconnect.
    pub async fn connect(&self) -> Result<()> {
        self.shared.connect(None).await
    }

    /// Send one length-prefixed frame
    ///
    /// Never waits for a connection: without one the frame is dropped and a
    /// background reconnect is scheduled.
    pub async fn send(&self, payload: &[u8]) -> SendOutcome {
        let shared = &self.shared;

        if payload.len() > codec::MAX_FRAME_LEN {
            warn!("Dropping {} byte frame: exceeds length prefix", payload.len());
            return shared.dropped(DropReason::Oversized);
        }

        // A reconnect holds the lock for the whole connect; never queue behind it
        if !shared.state.borrow().is_connected() {
            shared.request_reconnect();
            return shared.dropped(DropReason::NotConnected);
        }
        let mut conn = match shared.conn.try_lock() {
            Ok(conn) => conn,
            Err(_) => {
                if !shared.state.borrow().is_connected() {
                    shared.request_reconnect();
                    return shared.dropped(DropReason::NotConnected);
                }
                shared.conn.lock().await
            }
        };
        let Some(writer) = conn.as_mut() else {
            drop(conn);
            shared.request_reconnect();
            return shared.dropped(DropReason::NotConnected);
        };

        match codec::write_frame(writer, payload).await {
            Ok(()) => {
                let bytes = payload.len() + codec::HEADER_LEN;
                shared.frames_sent.fetch_add(1, Ordering::Relaxed);
                shared.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
                trace!("Sent {} byte frame", payload.len());
                SendOutcome::Sent { bytes }
            }
            Err(e) => {
                if let Some(mut broken) = conn.take() {
                    let _ = broken.shutdown().await;
                }
                shared.set_state(ConnectionState::Disconnected);
                drop(conn);

                warn_throttled!(
                    shared.throttler,
                    "send_failed",
                    "Send to {} failed, reconnecting: {}",
                    shared.endpoint,
                    e
                );
                shared.request_reconnect();
                shared.dropped(DropReason::WriteFailed)
            }
        }
    }

    /// Tear down the connection; safe to call repeatedly
    pub async fn close(&self) {
        let shared = &self.shared;
        let mut conn = shared.conn.lock().await;
        shared.generation.fetch_add(1, Ordering::AcqRel);

        if let Some(mut writer) = conn.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error while closing connection: {}", e);
            }
            info!("Disconnected from {}", shared.endpoint);
        }
        shared.set_state(ConnectionState::Disconnected);
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Get client statistics
    pub fn stats(&self) -> ClientStats {
        let shared = &self.shared;
        ClientStats {
            connect_attempts: shared.connect_attempts.load(Ordering::Relaxed),
            frames_sent: shared.frames_sent.load(Ordering::Relaxed),
            bytes_sent: shared.bytes_sent.load(Ordering::Relaxed),
            frames_dropped: shared.frames_dropped.load(Ordering::Relaxed),
        }
    }
}
