//! Capture boundary
//!
//! Platform camera stacks hand out frames from a small, fixed set of
//! buffers and expect each one back promptly. This module models that
//! contract:
//!
//! - [`FrameSource`]: what the pipeline pulls frames from
//! - [`CapturedFrame`]: a borrowed buffer, returned to its source on drop
//! - [`FramePool`]: bounded in-process source fed by a producer thread
//! - [`TestPattern`]: synthetic producer used when no camera is attached

pub mod pattern;
pub mod pool;

pub use pattern::{TestPattern, TestPatternConfig};
pub use pool::{FrameListener, FramePool, PoolStats, DEFAULT_MAX_IMAGES};

use crate::video::PlanarImage;

/// Producer of raw frames
pub trait FrameSource: Send + Sync + 'static {
    /// Take the newest pending frame without blocking
    ///
    /// Returns `None` when nothing is pending or when every buffer is
    /// already out with a consumer.
    fn acquire_latest(&self) -> Option<CapturedFrame>;

    /// (Re)acquire capture resources; called on every pipeline start
    fn open(&self) {}

    /// Release capture resources; called on pipeline stop
    fn close(&self) {}
}

/// A frame on loan from its source
///
/// Dropping it hands the buffer back, exactly once, on every path.
pub struct CapturedFrame {
    image: PlanarImage,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl CapturedFrame {
    pub fn new(image: PlanarImage, on_release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            image,
            on_release: Some(Box::new(on_release)),
        }
    }

    pub fn image(&self) -> &PlanarImage {
        &self.image
    }
}

impl Drop for CapturedFrame {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("resolution", &self.image.resolution())
            .finish()
    }
}
