//! Frame pipeline
//!
//! Glues capture to transport:
//!
//! ```text
//! FrameSource ──frame available──> worker ──> RateGate
//!                                               │ admit
//!                                               v
//!                         yuv420_to_nv21 ──> Encoder ──> StreamingClient::send
//! ```
//!
//! Capture threads only post events; a single worker task pulls the newest
//! frame, transcodes it on the blocking pool and sends it. Every acquired
//! frame is handed back to its source exactly once, whatever the outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::capture::FrameSource;
use crate::stream::{Connector, DropReason, SendOutcome, StreamingClient, TcpConnector};
use crate::utils::LogThrottler;
use crate::video::encoder::DEFAULT_JPEG_QUALITY;
use crate::video::{yuv420_to_nv21, Encoder, JpegEncoder, RateGate};
use crate::warn_throttled;

/// Pending events; extra frame notifications coalesce beyond this
const WORKER_QUEUE_DEPTH: usize = 2;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum frames sent per second (0 = unlimited)
    pub max_fps: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// How long stop() waits for the in-flight frame
    pub stop_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_fps: 10,
            quality: DEFAULT_JPEG_QUALITY,
            stop_timeout: Duration::from_millis(500),
        }
    }
}

/// What happened to one "frame available" event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Pipeline not running; nothing acquired
    Stopped,
    /// No frame pending, or no free buffer
    NoFrame,
    /// Arrived before the minimum interval elapsed
    RateLimited,
    /// Written to the connection
    Sent,
    /// Encoded but not sent
    Dropped(DropReason),
    /// Conversion or encoding failed
    TranscodeFailed,
}

/// Pipeline statistics
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Frame-available notifications received
    pub notifications: u64,
    /// Notifications merged into an already queued one
    pub coalesced: u64,
    pub frames_acquired: u64,
    pub rate_limited: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub transcode_failures: u64,
}

#[derive(Default)]
struct Counters {
    notifications: AtomicU64,
    coalesced: AtomicU64,
    frames_acquired: AtomicU64,
    rate_limited: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    transcode_failures: AtomicU64,
}

#[derive(Debug)]
enum WorkerEvent {
    Connect,
    FrameAvailable,
}

struct Worker {
    tx: mpsc::Sender<WorkerEvent>,
    task: JoinHandle<()>,
}

struct Inner<S: FrameSource, C: Connector> {
    source: Arc<S>,
    client: StreamingClient<C>,
    gate: RateGate,
    encoder: Arc<parking_lot::Mutex<Box<dyn Encoder>>>,
    running: AtomicBool,
    sequence: AtomicU64,
    epoch: Instant,
    counters: Counters,
    throttler: LogThrottler,
}

impl<S: FrameSource, C: Connector> Inner<S, C> {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    async fn process_frame(&self) -> FrameOutcome {
        if !self.running.load(Ordering::Acquire) {
            return FrameOutcome::Stopped;
        }
        let Some(frame) = self.source.acquire_latest() else {
            return FrameOutcome::NoFrame;
        };
        self.counters.frames_acquired.fetch_add(1, Ordering::Relaxed);

        if !self.gate.admit(self.now_ms()) {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            trace!("Frame rate limited");
            return FrameOutcome::RateLimited;
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let encoder = self.encoder.clone();
        let transcoded = tokio::task::spawn_blocking(move || {
            let result = yuv420_to_nv21(frame.image())
                .and_then(|nv21| encoder.lock().encode(&nv21, sequence));
            (frame, result)
        })
        .await;

        let (frame, encoded) = match transcoded {
            Ok((frame, Ok(encoded))) => (frame, encoded),
            Ok((_frame, Err(e))) => {
                self.counters.transcode_failures.fetch_add(1, Ordering::Relaxed);
                warn_throttled!(self.throttler, "transcode_failed", "Dropping frame {}: {}", sequence, e);
                return FrameOutcome::TranscodeFailed;
            }
            Err(e) => {
                self.counters.transcode_failures.fetch_add(1, Ordering::Relaxed);
                error!("Transcode task for frame {} failed: {}", sequence, e);
                return FrameOutcome::TranscodeFailed;
            }
        };

        if !self.running.load(Ordering::Acquire) {
            return FrameOutcome::Stopped;
        }

        let outcome = self.client.send(&encoded.data).await;
        drop(frame);

        match outcome {
            SendOutcome::Sent { bytes } => {
                self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                debug!(
                    sequence,
                    bytes,
                    resolution = %encoded.resolution,
                    "Frame sent"
                );
                FrameOutcome::Sent
            }
            SendOutcome::Dropped(reason) => {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Frame {} dropped: {}", sequence, reason);
                FrameOutcome::Dropped(reason)
            }
        }
    }
}

async fn run_worker<S: FrameSource, C: Connector>(
    inner: Arc<Inner<S, C>>,
    mut rx: mpsc::Receiver<WorkerEvent>,
) {
    debug!("Pipeline worker started");
    while let Some(event) = rx.recv().await {
        match event {
            WorkerEvent::Connect => {
                if inner.running.load(Ordering::Acquire) {
                    // best effort, failures are logged by the client
                    let _ = inner.client.connect().await;
                }
            }
            WorkerEvent::FrameAvailable => {
                let outcome = inner.process_frame().await;
                trace!(?outcome, "Frame processed");
            }
        }
    }
    debug!("Pipeline worker exited");
}

/// Capture-to-network pipeline
pub struct FramePipeline<S: FrameSource, C: Connector = TcpConnector> {
    inner: Arc<Inner<S, C>>,
    stop_timeout: Duration,
    worker: parking_lot::Mutex<Option<Worker>>,
}

impl<S: FrameSource, C: Connector> FramePipeline<S, C> {
    /// Create a stopped pipeline with the JPEG encoder
    pub fn new(source: Arc<S>, client: StreamingClient<C>, config: PipelineConfig) -> Self {
        let encoder: Box<dyn Encoder> = Box::new(JpegEncoder::with_quality(config.quality));
        Self::with_encoder(source, client, config, encoder)
    }

    /// Create a stopped pipeline with a custom encoder
    pub fn with_encoder(
        source: Arc<S>,
        client: StreamingClient<C>,
        config: PipelineConfig,
        encoder: Box<dyn Encoder>,
    ) -> Self {
        info!(
            "Pipeline: max {} fps, {} encoder, quality {}, sending to {}",
            config.max_fps,
            encoder.name(),
            encoder.config().quality,
            client.endpoint()
        );
        Self {
            inner: Arc::new(Inner {
                source,
                client,
                gate: RateGate::new(config.max_fps),
                encoder: Arc::new(parking_lot::Mutex::new(encoder)),
                running: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                epoch: Instant::now(),
                counters: Counters::default(),
                throttler: LogThrottler::default(),
            }),
            stop_timeout: config.stop_timeout,
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Start the worker and queue an initial connect
    ///
    /// Must be called from within a tokio runtime. No-op when running.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("Pipeline already running");
            return;
        }

        let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
        self.inner.source.open();
        self.inner.gate.reset();
        self.inner.running.store(true, Ordering::Release);
        let task = tokio::spawn(run_worker(self.inner.clone(), rx));
        if tx.try_send(WorkerEvent::Connect).is_err() {
            warn!("Failed to queue initial connect");
        }
        *worker = Some(Worker { tx, task });
        info!("Pipeline started");
    }

    /// Stop accepting frames, wait briefly for the in-flight one, then close
    /// the connection and the capture source
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(Worker { tx, mut task }) = worker else {
            debug!("Pipeline not running");
            return;
        };

        self.inner.running.store(false, Ordering::Release);
        drop(tx);

        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Pipeline worker failed: {}", e),
            Err(_) => warn!(
                "Pipeline worker still busy after {:?}, leaving it to finish",
                self.stop_timeout
            ),
        }

        if tokio::time::timeout(self.stop_timeout, self.inner.client.close())
            .await
            .is_err()
        {
            warn!("Timed out closing connection");
        }
        self.inner.source.close();

        let stats = self.stats();
        info!(
            sent = stats.frames_sent,
            dropped = stats.frames_dropped,
            rate_limited = stats.rate_limited,
            failed = stats.transcode_failures,
            "Pipeline stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Signal that the source has a new frame
    ///
    /// Never blocks; safe to call from capture threads. If the worker
    /// already has a notification queued this one merges into it.
    pub fn notify_frame_available(&self) {
        self.inner.counters.notifications.fetch_add(1, Ordering::Relaxed);
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            return;
        };
        if worker.tx.try_send(WorkerEvent::FrameAvailable).is_err() {
            self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Handle one frame inline
    ///
    /// This is what the worker runs for each notification.
    pub async fn process_frame(&self) -> FrameOutcome {
        self.inner.process_frame().await
    }

    /// Streaming client
    pub fn client(&self) -> &StreamingClient<C> {
        &self.inner.client
    }

    /// Get pipeline statistics
    pub fn stats(&self) -> PipelineStats {
        let c = &self.inner.counters;
        PipelineStats {
            notifications: c.notifications.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            frames_acquired: c.frames_acquired.load(Ordering::Relaxed),
            rate_limited: c.rate_limited.load(Ordering::Relaxed),
            frames_sent: c.frames_sent.load(Ordering::Relaxed),
            frames_dropped: c.frames_dropped.load(Ordering::Relaxed),
            transcode_failures: c.transcode_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FramePool, TestPattern, TestPatternConfig};
    use crate::error::{AppError, Result};
    use crate::stream::mock::MockConnector;
    use crate::video::{EncodedFrame, EncoderConfig, Nv21Frame, PlanarImage, Plane, Resolution};

    struct FailingEncoder {
        config: EncoderConfig,
    }

    impl Encoder for FailingEncoder {
        fn name(&self) -> &str {
            "failing"
        }

        fn encode(&mut self, _frame: &Nv21Frame, _sequence: u64) -> Result<EncodedFrame> {
            Err(AppError::Encode("injected failure".into()))
        }

        fn config(&self) -> &EncoderConfig {
            &self.config
        }
    }

    struct PanickingEncoder {
        config: EncoderConfig,
    }

    impl Encoder for PanickingEncoder {
        fn name(&self) -> &str {
            "panicking"
        }

        fn encode(&mut self, _frame: &Nv21Frame, _sequence: u64) -> Result<EncodedFrame> {
            panic!("encoder bug");
        }

        fn config(&self) -> &EncoderConfig {
            &self.config
        }
    }

    fn pattern() -> TestPattern {
        TestPattern::new(TestPatternConfig {
            resolution: Resolution::new(16, 16),
            fps: 30,
            row_padding: 4,
            chroma_pixel_stride: 2,
        })
    }

    fn pipeline(
        pool: &FramePool,
        connector: &MockConnector,
        max_fps: u32,
    ) -> FramePipeline<FramePool, MockConnector> {
        let client = StreamingClient::new(connector.clone(), Duration::ZERO);
        let config = PipelineConfig {
            max_fps,
            ..Default::default()
        };
        FramePipeline::new(Arc::new(pool.clone()), client, config)
    }

    fn assert_all_released(pool: &FramePool, acquired: u64) {
        let stats = pool.stats();
        assert_eq!(stats.acquired, acquired);
        assert_eq!(stats.released, acquired);
        assert_eq!(stats.outstanding, 0);
    }

    #[tokio::test]
    async fn test_sent_and_rate_limited_frames_are_released() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        let pipeline = pipeline(&pool, &connector, 10);
        pipeline.start();
        pipeline.client().connect().await.unwrap();

        let pattern = pattern();
        pool.push(pattern.frame(0));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::Sent);
        assert_all_released(&pool, 1);

        pool.push(pattern.frame(1));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::RateLimited);
        assert_all_released(&pool, 2);

        assert_eq!(pipeline.process_frame().await, FrameOutcome::NoFrame);

        let written = connector.written();
        assert_eq!(&written[..4], b"SEND");
        let len = i32::from_be_bytes([written[4], written[5], written[6], written[7]]) as usize;
        assert_eq!(written.len(), 8 + len);
        assert_eq!(&written[8..10], &[0xFF, 0xD8]);

        let stats = pipeline.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.rate_limited, 1);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_encoder_failure_releases_frame() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        let client = StreamingClient::new(connector.clone(), Duration::ZERO);
        let pipeline = FramePipeline::with_encoder(
            Arc::new(pool.clone()),
            client,
            PipelineConfig::default(),
            Box::new(FailingEncoder {
                config: EncoderConfig::default(),
            }),
        );
        pipeline.start();

        pool.push(pattern().frame(0));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::TranscodeFailed);
        assert_all_released(&pool, 1);
        assert_eq!(pipeline.stats().transcode_failures, 1);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_encoder_panic_drops_frame() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        let client = StreamingClient::new(connector.clone(), Duration::ZERO);
        let pipeline = FramePipeline::with_encoder(
            Arc::new(pool.clone()),
            client,
            PipelineConfig {
                max_fps: 0,
                ..Default::default()
            },
            Box::new(PanickingEncoder {
                config: EncoderConfig::default(),
            }),
        );
        pipeline.start();

        pool.push(pattern().frame(0));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::TranscodeFailed);
        assert_all_released(&pool, 1);

        // worker keeps going after the panic
        pool.push(pattern().frame(1));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::TranscodeFailed);
        assert_all_released(&pool, 2);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        let pipeline = pipeline(&pool, &connector, 0);

        pipeline.start();
        pipeline.client().connect().await.unwrap();
        pipeline.stop().await;
        assert!(!pool.push(pattern().frame(0)));

        pipeline.start();
        pipeline.client().connect().await.unwrap();
        assert!(pool.push(pattern().frame(1)));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::Sent);
        assert_all_released(&pool, 1);
        assert_eq!(connector.attempts(), 2);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_releases_frame() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        let pipeline = pipeline(&pool, &connector, 0);
        pipeline.start();

        // odd width
        pool.push(PlanarImage::new(
            Resolution::new(3, 2),
            Plane::packed(vec![0u8; 6], 3),
            Plane::packed(vec![0u8; 1], 1),
            Plane::packed(vec![0u8; 1], 1),
        ));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::TranscodeFailed);
        assert_all_released(&pool, 1);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_unreachable_receiver_drops_frame() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        connector.set_fail_connect(true);
        let pipeline = pipeline(&pool, &connector, 0);
        pipeline.start();

        pool.push(pattern().frame(0));
        assert_eq!(
            pipeline.process_frame().await,
            FrameOutcome::Dropped(DropReason::NotConnected)
        );
        assert_all_released(&pool, 1);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_pipeline_ignores_frames() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        let pipeline = pipeline(&pool, &connector, 0);

        pool.push(pattern().frame(0));
        assert_eq!(pipeline.process_frame().await, FrameOutcome::Stopped);
        assert_eq!(pool.stats().acquired, 0);

        pipeline.start();
        pipeline.stop().await;
        assert!(!pipeline.is_running());
        assert!(!pipeline.client().state().is_connected());
        // source closed
        assert!(!pool.push(pattern().frame(1)));
    }

    #[tokio::test]
    async fn test_notifications_drive_worker() {
        let pool = FramePool::new(2);
        let connector = MockConnector::default();
        let pipeline = Arc::new(pipeline(&pool, &connector, 0));

        let weak = Arc::downgrade(&pipeline);
        pool.set_listener(Arc::new(move || {
            if let Some(pipeline) = weak.upgrade() {
                pipeline.notify_frame_available();
            }
        }));
        pipeline.start();

        let pattern = pattern();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut index = 0;
        while pipeline.stats().frames_sent == 0 && Instant::now() < deadline {
            pool.push(pattern.frame(index));
            index += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(pipeline.stats().frames_sent >= 1);
        assert!(pipeline.stats().notifications >= 1);

        pipeline.stop().await;
        let stats = pool.stats();
        assert_eq!(stats.acquired, stats.released);
    }
}
