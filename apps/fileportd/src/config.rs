//! Server configuration file.
//!
//! JSON with camelCase keys, every field optional. A missing file means
//! defaults; a file that does not parse is reported and ignored.

use std::path::Path;

use anyhow::Context;
use fileport_server::ServerConfig;

/// Used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "fileportd.json";

pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(ServerConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    match serde_json::from_str::<ServerConfig>(&content) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse server config, using defaults"
            );
            Ok(ServerConfig::default())
        }
    }
}
