//! Bounded frame pool
//!
//! A fixed number of image slots shared between a producer (capture
//! thread) and one consumer (the pipeline worker). A slot is busy while its
//! frame is pending or on loan. When the producer finds every slot busy it
//! overwrites the oldest pending frame; if all slots are on loan the new
//! frame is discarded. The consumer always receives the newest pending
//! frame and older pending ones are discarded with it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{CapturedFrame, FrameSource};
use crate::video::PlanarImage;

/// Default number of image slots
pub const DEFAULT_MAX_IMAGES: usize = 2;

/// Callback fired after each accepted frame ("frame available")
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

/// Pool statistics
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Frames offered by the producer
    pub pushed: u64,
    /// Frames discarded without reaching a consumer
    pub dropped: u64,
    /// Frames handed to a consumer
    pub acquired: u64,
    /// Frames handed back by a consumer
    pub released: u64,
    /// Frames currently on loan
    pub outstanding: usize,
    /// Frames waiting for a consumer
    pub pending: usize,
}

struct Slots {
    pending: VecDeque<PlanarImage>,
    outstanding: usize,
}

struct PoolInner {
    slots: Mutex<Slots>,
    max_images: usize,
    listener: RwLock<Option<FrameListener>>,
    closed: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl PoolInner {
    fn release(&self) {
        let mut slots = self.slots.lock();
        slots.outstanding = slots.outstanding.saturating_sub(1);
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bounded pool of captured images (cheap to clone)
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Create a pool with `max_images` slots (at least one)
    pub fn new(max_images: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(Slots {
                    pending: VecDeque::with_capacity(max_images.max(1)),
                    outstanding: 0,
                }),
                max_images: max_images.max(1),
                listener: RwLock::new(None),
                closed: AtomicBool::new(false),
                pushed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    pub fn max_images(&self) -> usize {
        self.inner.max_images
    }

    /// Register the "frame available" callback
    pub fn set_listener(&self, listener: FrameListener) {
        *self.inner.listener.write() = Some(listener);
    }

    /// Offer a new frame from the producer side
    ///
    /// Returns `false` if the frame was discarded because the pool is closed
    /// or every slot is on loan.
    pub fn push(&self, image: PlanarImage) -> bool {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return false;
        }
        inner.pushed.fetch_add(1, Ordering::Relaxed);

        {
            let mut slots = inner.slots.lock();
            if slots.pending.len() + slots.outstanding >= inner.max_images {
                if slots.pending.pop_front().is_none() {
                    inner.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!("All {} image slots on loan, discarding frame", inner.max_images);
                    return false;
                }
                inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            slots.pending.push_back(image);
        }

        let listener = inner.listener.read().clone();
        if let Some(listener) = listener {
            listener();
        }
        true
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let slots = self.inner.slots.lock();
        PoolStats {
            pushed: self.inner.pushed.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            outstanding: slots.outstanding,
            pending: slots.pending.len(),
        }
    }
}

impl FrameSource for FramePool {
    fn acquire_latest(&self) -> Option<CapturedFrame> {
        let inner = &self.inner;
        let image = {
            let mut slots = inner.slots.lock();
            if slots.outstanding >= inner.max_images {
                return None;
            }
            let newest = slots.pending.pop_back()?;
            let stale = slots.pending.len() as u64;
            if stale > 0 {
                slots.pending.clear();
                inner.dropped.fetch_add(stale, Ordering::Relaxed);
            }
            slots.outstanding += 1;
            newest
        };
        inner.acquired.fetch_add(1, Ordering::Relaxed);

        let owner = self.inner.clone();
        Some(CapturedFrame::new(image, move || owner.release()))
    }

    fn open(&self) {
        if self.inner.closed.swap(false, Ordering::AcqRel) {
            debug!("Frame pool reopened");
        }
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let discarded = {
                let mut slots = self.inner.slots.lock();
                let n = slots.pending.len();
                slots.pending.clear();
                n
            };
            self.inner
                .dropped
                .fetch_add(discarded as u64, Ordering::Relaxed);
            debug!("Frame pool closed, {} pending frames discarded", discarded);
        }
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGES)
    }
}
