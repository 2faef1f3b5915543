//! In-memory connector for failure injection in tests

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWrite;

use super::client::Connector;

#[derive(Default)]
struct MockState {
    written: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
    fail_connect: AtomicBool,
    dead: AtomicBool,
    connect_delay: Mutex<Duration>,
    attempts: AtomicUsize,
    shutdowns: AtomicUsize,
}

/// Connector whose streams append to one shared buffer
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.written.lock().clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Delay every connect attempt
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    /// Make every open stream fail the liveness check
    pub fn set_dead(&self, dead: bool) {
        self.state.dead.store(dead, Ordering::SeqCst);
    }
}

pub(crate) struct MockStream {
    state: Arc<MockState>,
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        self.state.written.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Stream = MockStream;

    async fn connect(&self) -> io::Result<MockStream> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "injected connect failure",
            ));
        }
        Ok(MockStream {
            state: self.state.clone(),
        })
    }

    fn is_alive(&self, _stream: &MockStream) -> bool {
        !self.state.dead.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}
