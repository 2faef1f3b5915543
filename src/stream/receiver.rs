//! Frame receiver
//!
//! Listening end of the wire protocol. Each accepted connection announces
//! its role with a 4-byte token; senders then stream length-prefixed
//! frames which are published on a broadcast channel. Unknown roles are
//! logged and closed.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec;
use crate::error::Result;

/// Broadcast channel depth; slow subscribers skip frames
const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Frame received from a sender
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub peer: SocketAddr,
    /// Position within the sender's connection, starting at 0
    pub sequence: u64,
    pub data: Bytes,
}

/// Receiver statistics
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    pub connections: u64,
    pub frames: u64,
    pub bytes: u64,
}

#[derive(Default)]
struct Counters {
    connections: AtomicU64,
    frames: AtomicU64,
    bytes: AtomicU64,
}

/// TCP frame receiver
pub struct FrameReceiver {
    listener: TcpListener,
    max_frame_len: usize,
    frame_tx: broadcast::Sender<ReceivedFrame>,
    counters: Arc<Counters>,
}

impl FrameReceiver {
    /// Bind the listening socket
    pub async fn bind(addr: &str, max_frame_len: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (frame_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Ok(Self {
            listener,
            max_frame_len,
            frame_tx,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Subscribe to received frames
    pub fn subscribe(&self) -> broadcast::Receiver<ReceivedFrame> {
        self.frame_tx.subscribe()
    }

    /// Get receiver statistics
    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            connections: self.counters.connections.load(Ordering::Relaxed),
            frames: self.counters.frames.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
        }
    }

    /// Accept connections until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("Frame receiver listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Frame receiver shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    self.counters.connections.fetch_add(1, Ordering::Relaxed);

                    let handler = ConnectionHandler {
                        peer,
                        max_frame_len: self.max_frame_len,
                        frame_tx: self.frame_tx.clone(),
                        counters: self.counters.clone(),
                    };
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.run(stream, cancel).await {
                            warn!("Connection from {} ended with error: {}", peer, e);
                        }
                    });
                }
            }
        }
    }
}

struct ConnectionHandler {
    peer: SocketAddr,
    max_frame_len: usize,
    frame_tx: broadcast::Sender<ReceivedFrame>,
    counters: Arc<Counters>,
}

impl ConnectionHandler {
    async fn run(self, stream: TcpStream, cancel: CancellationToken) -> io::Result<()> {
        let mut reader = BufReader::new(stream);

        let role = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            role = codec::read_role(&mut reader) => role?,
        };
        if &role != codec::HANDSHAKE_TOKEN {
            warn!(
                "Closing connection from {}: unknown role {:?}",
                self.peer,
                String::from_utf8_lossy(&role)
            );
            return Ok(());
        }
        info!("Sender connected from {}", self.peer);

        let mut sequence = 0u64;
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = codec::read_frame(&mut reader, self.max_frame_len) => frame,
            };
            let data = match frame {
                Ok(data) => data.freeze(),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("Sender {} disconnected after {} frames", self.peer, sequence);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            self.counters.frames.fetch_add(1, Ordering::Relaxed);
            self.counters
                .bytes
                .fetch_add(data.len() as u64, Ordering::Relaxed);
            debug!("Frame {} from {}: {} bytes", sequence, self.peer, data.len());

            // no subscribers is fine
            let _ = self.frame_tx.send(ReceivedFrame {
                peer: self.peer,
                sequence,
                data,
            });
            sequence += 1;
        }
    }
}
