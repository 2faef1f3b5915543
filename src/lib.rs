//! camlink - camera frame streaming
//!
//! This crate takes raw YUV 4:2:0 camera frames, converts them to NV21,
//! compresses them to JPEG and streams them to a remote receiver over a
//! length-prefixed TCP protocol that reconnects on its own.

pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod stream;
pub mod utils;
pub mod video;

pub use error::{AppError, Result};
