//! Frame geometry

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions non-zero and even, as 4:2:0 sub-sampling requires
    pub fn is_even(&self) -> bool {
        self.width >= 2 && self.height >= 2 && self.width % 2 == 0 && self.height % 2 == 0
    }

    /// Get total pixels
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Dimensions of each sub-sampled chroma plane (floor division)
    pub fn chroma(&self) -> Resolution {
        Resolution::new(self.width / 2, self.height / 2)
    }

    /// Size of an NV21 buffer: full luma plus half as many interleaved VU bytes
    pub fn nv21_size(&self) -> usize {
        let pixels = self.pixels();
        pixels + pixels / 2
    }

    /// Common resolutions
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };
    pub const HD720: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
    pub const HD1080: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nv21_size() {
        assert_eq!(Resolution::HD720.nv21_size(), 1280 * 720 * 3 / 2);
        assert_eq!(Resolution::new(4, 2).nv21_size(), 12);
    }

    #[test]
    fn test_even_dimensions() {
        assert!(Resolution::VGA.is_even());
        assert!(!Resolution::new(3, 2).is_even());
        assert!(!Resolution::new(0, 0).is_even());
        assert_eq!(Resolution::HD1080.chroma(), Resolution::new(960, 540));
    }
}
