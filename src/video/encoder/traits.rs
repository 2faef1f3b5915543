//! Encoder traits and common types

use bytes::Bytes;
use std::time::Instant;

use crate::error::Result;
use crate::video::format::Resolution;
use crate::video::frame::Nv21Frame;

/// Default JPEG quality on a 0-100 scale
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Output quality (1-100)
    pub quality: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl EncoderConfig {
    pub fn jpeg(quality: u8) -> Self {
        Self { quality }
    }
}

/// Encoded frame output
///
/// The payload is immutable once produced; the streaming client borrows it
/// for the duration of one write.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded data
    pub data: Bytes,
    /// Resolution
    pub resolution: Resolution,
    /// Frame sequence number
    pub sequence: u64,
    /// Encoding timestamp
    pub timestamp: Instant,
}

impl EncodedFrame {
    pub fn jpeg(data: Bytes, resolution: Resolution, sequence: u64) -> Self {
        Self {
            data,
            resolution,
            sequence,
            timestamp: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Generic encoder trait
/// Note: Not Sync, encoders keep scratch buffers and are driven from one worker
pub trait Encoder: Send {
    /// Get encoder name
    fn name(&self) -> &str;

    /// Encode one NV21 frame
    fn encode(&mut self, frame: &Nv21Frame, sequence: u64) -> Result<EncodedFrame>;

    /// Get current configuration
    fn config(&self) -> &EncoderConfig;
}
