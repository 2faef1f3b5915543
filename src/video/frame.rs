//! Video frame data structures

use bytes::Bytes;
use std::time::Instant;

use super::format::Resolution;

/// One channel of a planar image
///
/// Samples are addressed as `row * row_stride + col * pixel_stride`. A row
/// stride larger than the logical width means alignment padding; a pixel
/// stride above 1 means the buffer interleaves samples of another plane.
#[derive(Debug, Clone)]
pub struct Plane {
    data: Bytes,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data: data.into(),
            row_stride,
            pixel_stride,
        }
    }

    /// Tightly packed plane (`pixel_stride == 1`)
    pub fn packed(data: impl Into<Bytes>, row_stride: usize) -> Self {
        Self::new(data, row_stride, 1)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// Byte offset of the sample at (`row`, `col`)
    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> usize {
        row * self.row_stride + col * self.pixel_stride
    }

    /// Smallest buffer length that holds `rows` x `cols` samples. The final
    /// row does not need its padding.
    pub fn required_len(&self, rows: usize, cols: usize) -> usize {
        if rows == 0 || cols == 0 {
            return 0;
        }
        self.offset(rows - 1, cols - 1) + 1
    }
}

/// Three-plane YCbCr 4:2:0 image as delivered by a capture source
///
/// Plane order is Y, U (Cb), V (Cr). Chroma planes cover
/// `width / 2` x `height / 2` samples.
#[derive(Debug, Clone)]
pub struct PlanarImage {
    resolution: Resolution,
    planes: [Plane; 3],
    /// Timestamp when the frame was captured
    pub capture_ts: Instant,
}

impl PlanarImage {
    pub fn new(resolution: Resolution, y: Plane, u: Plane, v: Plane) -> Self {
        Self {
            resolution,
            planes: [y, u, v],
            capture_ts: Instant::now(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn y_plane(&self) -> &Plane {
        &self.planes[0]
    }

    pub fn u_plane(&self) -> &Plane {
        &self.planes[1]
    }

    pub fn v_plane(&self) -> &Plane {
        &self.planes[2]
    }

    /// Age of this frame (time since capture)
    pub fn age(&self) -> std::time::Duration {
        self.capture_ts.elapsed()
    }
}

/// NV21 buffer: Y plane followed by an interleaved VU plane
#[derive(Debug, Clone)]
pub struct Nv21Frame {
    data: Vec<u8>,
    resolution: Resolution,
}

impl Nv21Frame {
    /// Wrap an existing NV21 buffer. The caller guarantees the layout.
    pub fn from_vec(data: Vec<u8>, resolution: Resolution) -> Self {
        Self { data, resolution }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn y_plane(&self) -> &[u8] {
        &self.data[..self.resolution.pixels()]
    }

    /// Interleaved chroma, V first in each pair
    pub fn vu_plane(&self) -> &[u8] {
        &self.data[self.resolution.pixels()..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}
