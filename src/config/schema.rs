use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::{TestPatternConfig, DEFAULT_MAX_IMAGES};
use crate::error::{AppError, Result};
use crate::pipeline::PipelineConfig;
use crate::stream::codec::MAX_FRAME_LEN;
use crate::video::Resolution;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Receiver endpoint and reconnect policy
    pub stream: StreamConfig,
    /// Output rate and quality
    pub video: VideoConfig,
    /// Test pattern source
    pub capture: CaptureConfig,
    /// `camlink receive` settings
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.stream.host.trim().is_empty() {
            return Err(AppError::Config("stream.host must not be empty".into()));
        }
        if self.stream.port == 0 {
            return Err(AppError::Config("stream.port must not be 0".into()));
        }
        if self.video.max_fps == 0 {
            return Err(AppError::Config("video.max_fps must be at least 1".into()));
        }
        if !(1..=100).contains(&self.video.quality) {
            return Err(AppError::Config(format!(
                "video.quality must be 1-100, got {}",
                self.video.quality
            )));
        }

        let capture = &self.capture;
        if !Resolution::new(capture.width, capture.height).is_even() {
            return Err(AppError::Config(format!(
                "capture size must be even and non-zero, got {}x{}",
                capture.width, capture.height
            )));
        }
        if capture.fps == 0 {
            return Err(AppError::Config("capture.fps must be at least 1".into()));
        }
        if !(1..=2).contains(&capture.chroma_pixel_stride) {
            return Err(AppError::Config(format!(
                "capture.chroma_pixel_stride must be 1 or 2, got {}",
                capture.chroma_pixel_stride
            )));
        }
        if capture.max_images == 0 {
            return Err(AppError::Config("capture.max_images must be at least 1".into()));
        }

        if self.receiver.max_frame_bytes == 0 || self.receiver.max_frame_bytes > MAX_FRAME_LEN {
            return Err(AppError::Config(format!(
                "receiver.max_frame_bytes must be 1-{}",
                MAX_FRAME_LEN
            )));
        }
        Ok(())
    }
}

/// Streaming client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Receiver host name or address
    pub host: String,
    /// Receiver port
    pub port: u16,
    /// Per-attempt connect timeout in ms (0 = OS default)
    pub connect_timeout_ms: u64,
    /// Minimum time between scheduled reconnects in ms (0 = every failed send)
    pub reconnect_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            connect_timeout_ms: 5000,
            reconnect_interval_ms: 0,
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Maximum frames sent per second
    pub max_fps: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// How long stop waits for the in-flight frame, in ms
    pub stop_timeout_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_fps: 10,
            quality: 70,
            stop_timeout_ms: 500,
        }
    }
}

impl VideoConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_fps: self.max_fps,
            quality: self.quality,
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

/// Test pattern source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// Producer frame rate
    pub fps: u32,
    /// Padding bytes appended to every row
    pub row_padding: usize,
    /// 1 = planar chroma, 2 = interleaved
    pub chroma_pixel_stride: usize,
    /// Image slots shared with the pipeline
    pub max_images: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            row_padding: 64,
            chroma_pixel_stride: 2,
            max_images: DEFAULT_MAX_IMAGES,
        }
    }
}

impl CaptureConfig {
    pub fn pattern_config(&self) -> TestPatternConfig {
        TestPatternConfig {
            resolution: Resolution::new(self.width, self.height),
            fps: self.fps,
            row_padding: self.row_padding,
            chroma_pixel_stride: self.chroma_pixel_stride,
        }
    }
}

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Listen address
    pub listen: String,
    /// Largest accepted frame
    pub max_frame_bytes: usize,
    /// Directory for `latest.jpg` (None = don't write frames)
    pub output_dir: Option<PathBuf>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".to_string(),
            max_frame_bytes: 16 * 1024 * 1024,
            output_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stream.port, 5000);
        assert_eq!(config.video.quality, 70);
        assert_eq!(config.stream.connect_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.stream.reconnect_interval(), Duration::ZERO);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [stream]
            host = "10.0.0.2"

            [video]
            max_fps = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.host, "10.0.0.2");
        assert_eq!(config.stream.port, 5000);
        assert_eq!(config.video.max_fps, 5);
        assert_eq!(config.video.quality, 70);
        assert_eq!(config.capture.width, 1280);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.stream.port = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.video.quality = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.video.max_fps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.width = 641;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.chroma_pixel_stride = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_connect_timeout_means_none() {
        let stream = StreamConfig {
            connect_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(stream.connect_timeout(), None);
    }
}
