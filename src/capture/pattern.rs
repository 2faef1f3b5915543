//! Synthetic frame producer
//!
//! Generates moving colour bars in the same memory layout camera HALs use
//! for YUV 4:2:0 output: padded luma rows and, with `chroma_pixel_stride`
//! 2, U and V planes that are offset views into one interleaved buffer.

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pool::FramePool;
use crate::video::{PlanarImage, Plane, Resolution};

/// Test pattern configuration
#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    pub resolution: Resolution,
    /// Producer frame rate
    pub fps: u32,
    /// Extra bytes at the end of every luma and chroma row
    pub row_padding: usize,
    /// 1 = planar chroma, 2 = interleaved chroma buffer
    pub chroma_pixel_stride: usize,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::HD720,
            fps: 30,
            row_padding: 64,
            chroma_pixel_stride: 2,
        }
    }
}

/// Colour bars (Y, U, V)
const BARS: [(u8, u8, u8); 8] = [
    (235, 128, 128), // white
    (210, 16, 146),  // yellow
    (170, 166, 16),  // cyan
    (145, 54, 34),   // green
    (106, 202, 222), // magenta
    (81, 90, 240),   // red
    (41, 240, 110),  // blue
    (16, 128, 128),  // black
];

/// Synthetic camera
pub struct TestPattern {
    config: TestPatternConfig,
}

impl TestPattern {
    pub fn new(config: TestPatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestPatternConfig {
        &self.config
    }

    /// Render frame `index`; bars scroll one chroma column per frame
    pub fn frame(&self, index: u64) -> PlanarImage {
        let res = self.config.resolution;
        let width = res.width as usize;
        let height = res.height as usize;
        let chroma = res.chroma();
        let cw = chroma.width as usize;
        let ch = chroma.height as usize;
        let ps = self.config.chroma_pixel_stride.max(1);
        let pad = self.config.row_padding;

        let bar_of = |col: usize| -> (u8, u8, u8) {
            let shifted = (col + index as usize) % cw.max(1);
            BARS[shifted * BARS.len() / cw.max(1)]
        };

        let y_stride = width + pad;
        let mut y = vec![0u8; y_stride * height];
        for row in 0..height {
            for col in 0..width {
                y[row * y_stride + col] = bar_of(col / 2).0;
            }
        }
        let y = Plane::packed(y, y_stride);

        let c_stride = cw * ps + pad;
        if ps >= 2 {
            // One interleaved buffer, U at offset 0 and V at offset 1
            let mut uv = vec![0u8; c_stride * ch];
            for row in 0..ch {
                for col in 0..cw {
                    let (_, u, v) = bar_of(col);
                    uv[row * c_stride + col * ps] = u;
                    uv[row * c_stride + col * ps + 1] = v;
                }
            }
            let uv = Bytes::from(uv);
            let u = Plane::new(uv.slice(..), c_stride, ps);
            let v = Plane::new(uv.slice(1..), c_stride, ps);
            PlanarImage::new(res, y, u, v)
        } else {
            let mut u = vec![0u8; c_stride * ch];
            let mut v = vec![0u8; c_stride * ch];
            for row in 0..ch {
                for col in 0..cw {
                    let (_, cb, cr) = bar_of(col);
                    u[row * c_stride + col] = cb;
                    v[row * c_stride + col] = cr;
                }
            }
            PlanarImage::new(res, y, Plane::packed(u, c_stride), Plane::packed(v, c_stride))
        }
    }

    /// Run the producer on a dedicated thread until `cancel` fires
    pub fn spawn(
        self,
        pool: FramePool,
        cancel: CancellationToken,
    ) -> std::io::Result<thread::JoinHandle<u64>> {
        thread::Builder::new()
            .name("camlink-pattern".into())
            .spawn(move || self.run(&pool, &cancel))
    }

    fn run(&self, pool: &FramePool, cancel: &CancellationToken) -> u64 {
        let interval = Duration::from_secs(1) / self.config.fps.max(1);
        info!(
            resolution = %self.config.resolution,
            fps = self.config.fps,
            row_padding = self.config.row_padding,
            chroma_pixel_stride = self.config.chroma_pixel_stride,
            "Test pattern started"
        );

        let mut index = 0u64;
        let mut next = Instant::now();
        while !cancel.is_cancelled() {
            pool.push(self.frame(index));
            index += 1;

            next += interval;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
        debug!("Test pattern stopped after {} frames", index);
        index
    }
}
