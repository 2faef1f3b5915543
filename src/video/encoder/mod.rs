//! Video encoder implementations
//!
//! JPEG is the only output format: every admitted frame is compressed
//! independently and shipped as one length-prefixed message.

pub mod jpeg;
pub mod traits;

// Core traits and types
pub use traits::{EncodedFrame, Encoder, EncoderConfig, DEFAULT_JPEG_QUALITY};

// JPEG encoder
pub use jpeg::{encode_nv21, JpegEncoder};
