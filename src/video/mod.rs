//! Frame transcoding
//!
//! This module turns captured planar YCbCr frames into JPEG payloads:
//! NV21 conversion, JPEG encoding and output rate gating.

pub mod convert;
pub mod encoder;
pub mod format;
pub mod frame;
pub mod pacer;

pub use convert::yuv420_to_nv21;
pub use encoder::{encode_nv21, EncodedFrame, Encoder, EncoderConfig, JpegEncoder};
pub use format::Resolution;
pub use frame::{Nv21Frame, PlanarImage, Plane};
pub use pacer::{PacerStats, RateGate};
