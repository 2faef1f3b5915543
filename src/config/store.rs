use std::path::Path;
use tracing::{debug, info};

use super::AppConfig;
use crate::error::{AppError, Result};

/// Load and validate configuration from a TOML file
pub async fn load(path: &Path) -> Result<AppConfig> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config: AppConfig = toml::from_str(&text)?;
    config.validate()?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load `path` if given, otherwise use the defaults
pub async fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load(path).await,
        None => {
            debug!("No configuration file, using defaults");
            Ok(AppConfig::default())
        }
    }
}
