//! JPEG encoder implementation
//!
//! NV21 is expanded to RGB24 with BT.601 fixed-point arithmetic, then
//! compressed with the pure-Rust encoder from the `image` crate.
//!
//! ```text
//! NV21 ──BT.601──> RGB24 ──image::codecs::jpeg──> JPEG
//! ```

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use super::traits::{EncodedFrame, Encoder, EncoderConfig};
use crate::error::{AppError, Result};
use crate::video::format::Resolution;
use crate::video::frame::Nv21Frame;

/// JPEG encoder
///
/// Keeps its RGB scratch buffer between frames, so it is driven from a
/// single worker (or behind a Mutex).
pub struct JpegEncoder {
    config: EncoderConfig,
    rgb_buffer: Vec<u8>,
}

impl JpegEncoder {
    /// Create a new JPEG encoder
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            rgb_buffer: Vec::new(),
        }
    }

    /// Create with specific quality
    pub fn with_quality(quality: u8) -> Self {
        Self::new(EncoderConfig::jpeg(quality))
    }

    /// Set JPEG quality (1-100)
    pub fn set_quality(&mut self, quality: u8) {
        self.config.quality = quality;
    }
}

impl Encoder for JpegEncoder {
    fn name(&self) -> &str {
        "JPEG (image)"
    }

    fn encode(&mut self, frame: &Nv21Frame, sequence: u64) -> Result<EncodedFrame> {
        let resolution = frame.resolution();
        let jpeg = encode_nv21_with(
            &mut self.rgb_buffer,
            frame.as_bytes(),
            resolution.width,
            resolution.height,
            self.config.quality,
        )?;
        Ok(EncodedFrame::jpeg(Bytes::from(jpeg), resolution, sequence))
    }

    fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

/// Compress an NV21 buffer to JPEG
///
/// Fails with [`AppError::Encode`] on zero or odd dimensions, or when `data`
/// is not exactly `width * height * 3 / 2` bytes. `quality` is clamped to
/// 1..=100.
pub fn encode_nv21(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let mut rgb = Vec::new();
    encode_nv21_with(&mut rgb, data, width, height, quality)
}

fn encode_nv21_with(
    rgb: &mut Vec<u8>,
    data: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>> {
    let resolution = Resolution::new(width, height);
    if !resolution.is_even() {
        return Err(AppError::Encode(format!(
            "invalid dimensions {}",
            resolution
        )));
    }
    let expected = resolution.nv21_size();
    if data.len() != expected {
        return Err(AppError::Encode(format!(
            "NV21 buffer size mismatch: {} != {}",
            data.len(),
            expected
        )));
    }

    nv21_to_rgb(data, rgb, width as usize, height as usize);

    let mut jpeg = Vec::with_capacity(expected / 4);
    let mut encoder = ImageJpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder
        .encode(rgb.as_slice(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| AppError::Encode(format!("JPEG compression failed: {}", e)))?;
    Ok(jpeg)
}

/// BT.601 limited-range NV21 → RGB24
fn nv21_to_rgb(nv21: &[u8], rgb: &mut Vec<u8>, width: usize, height: usize) {
    let (y_plane, vu_plane) = nv21.split_at(width * height);
    rgb.clear();
    rgb.resize(width * height * 3, 0);

    for row in 0..height {
        let y_row = &y_plane[row * width..(row + 1) * width];
        let vu_row = &vu_plane[(row / 2) * width..];
        let out_row = &mut rgb[row * width * 3..(row + 1) * width * 3];

        for (col, &luma) in y_row.iter().enumerate() {
            let pair = (col / 2) * 2;
            let v = vu_row[pair] as i32 - 128;
            let u = vu_row[pair + 1] as i32 - 128;

            let y = ((luma as i32 - 16) * 149) >> 7;
            let r = y + ((179 * v) >> 7);
            let g = y - ((44 * u) >> 7) - ((91 * v) >> 7);
            let b = y + ((227 * u) >> 7);

            let px = &mut out_row[col * 3..col * 3 + 3];
            px[0] = r.clamp(0, 255) as u8;
            px[1] = g.clamp(0, 255) as u8;
            px[2] = b.clamp(0, 255) as u8;
        }
    }
}
