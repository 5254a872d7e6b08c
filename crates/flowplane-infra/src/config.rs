//! Configuration loader for Flowplane.
//!
//! Reads `config.toml` from the data directory (`~/.flowplane/` in production)
//! and deserializes it into [`ControlPlaneConfig`]. Falls back to defaults
//! when the file is missing or malformed.

use std::path::{Path, PathBuf};

use flowplane_types::config::ControlPlaneConfig;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "FLOWPLANE_DATA_DIR";

/// Resolve the data directory: `FLOWPLANE_DATA_DIR` if set, otherwise
/// `~/.flowplane`, otherwise `./.flowplane`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".flowplane")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ControlPlaneConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config; missing fields take their defaults.
pub async fn load_config(data_dir: &Path) -> ControlPlaneConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ControlPlaneConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ControlPlaneConfig::default();
        }
    };

    match toml::from_str::<ControlPlaneConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ControlPlaneConfig::default()
        }
    }
}
