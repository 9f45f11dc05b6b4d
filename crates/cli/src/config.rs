//! CLI configuration utilities

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use swiftmeal_http::ClientConfig;

/// Config file looked up in the data directory when `--config` is absent
pub const CONFIG_FILE: &str = "config.toml";

/// Durable session file in the data directory
pub const SESSION_FILE: &str = "session.json";

/// `--data-dir`, else `SWIFTMEAL_STATE_DIR`, else the platform data directory
pub fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        // Check environment variable first, then fall back to system data dir
        if let Ok(state_dir) = std::env::var("SWIFTMEAL_STATE_DIR") {
            PathBuf::from(state_dir)
        } else {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("swiftmeal")
        }
    })
}

/// Load client configuration, preferring an explicit file
pub fn load_client_config(
    explicit: Option<&Path>,
    data_dir: &Path,
    api_url: Option<String>,
) -> Result<ClientConfig> {
    let default_path = data_dir.join(CONFIG_FILE);
    let path = match explicit {
        Some(path) => Some(path),
        None if default_path.exists() => Some(default_path.as_path()),
        None => None,
    };

    let mut config = ClientConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;

    if let Some(api_url) = api_url {
        config.api_url = api_url;
    }
    Ok(config)
}

/// Save client configuration as TOML
pub fn save_client_config<P: AsRef<Path>>(config: &ClientConfig, path: P) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Generate a default configuration file
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    save_client_config(&ClientConfig::default(), path)
}
