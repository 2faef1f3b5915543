use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed image: {0}")]
    MalformedImage(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl AppError {
    /// Transport-level failures. A failed handshake counts as one: the
    /// socket is torn down the same way and the next frame reconnects.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, AppError::Connection(_) | AppError::Handshake(_))
    }

    /// Errors confined to a single frame
    pub fn is_frame_error(&self) -> bool {
        matches!(self, AppError::MalformedImage(_) | AppError::Encode(_))
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
