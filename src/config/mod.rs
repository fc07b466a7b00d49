pub mod device_config;
pub mod link_config;
pub mod pulse_config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::device_config::DeviceConfig;
use crate::config::link_config::LinkConfig;
use crate::config::pulse_config::PulseConfig;
use crate::utils::ensure_directory_exists;

/// File used when neither the command line nor the environment names one.
pub const DEFAULT_CONFIG_FILE: &str = "bracelet_link.json";

/// Environment variable consulted for the config path.
pub const CONFIG_PATH_ENV: &str = "BRACELET_LINK_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: String,
    pub link: LinkConfig,
    pub device: DeviceConfig,
    pub pulse: PulseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            log_level: "info".to_string(),
            link: LinkConfig::default(),
            device: DeviceConfig::default(),
            pulse: PulseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Picks the config path: explicit argument, then environment, then default.
    pub fn resolve_path(arg: Option<String>, env: Option<String>) -> PathBuf {
        arg.or(env)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Loads the config from a configuration file.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found at {:?}, using default.", path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&config_json)?;
        config.link.endpoint()?;

        info!("Config loaded from {:?}", path);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_directory_exists(parent).await?;
        }

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(path, config_json).await?;

        info!("Config saved to {:?}.", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("bracelet-link-config-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn resolve_path_prefers_argument_over_environment() {
        let path = AppConfig::resolve_path(Some("a.json".into()), Some("b.json".into()));
        assert_eq!(path, PathBuf::from("a.json"));

        let path = AppConfig::resolve_path(None, Some("b.json".into()));
        assert_eq!(path, PathBuf::from("b.json"));

        let path = AppConfig::resolve_path(None, Some("  ".into()));
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = AppConfig::load(&temp_path("missing.json")).await.unwrap();
        assert_eq!(config.link.reconnect_delay_ms, 5000);
        assert_eq!(config.device.battery_poll_secs, 60);
        assert_eq!(config.device.rssi_poll_secs, 5);
    }

    #[tokio::test]
    async fn save_then_load_keeps_overrides() {
        let path = temp_path("roundtrip/config.json");
        let mut config = AppConfig::default();
        config.link.server_url = "ws://10.0.0.7:9000/link".to_string();
        config.pulse.confirmation_duration_ms = 250;

        config.save(&path).await.unwrap();
        let loaded = AppConfig::load(&path).await.unwrap();

        assert_eq!(loaded.link.server_url, "ws://10.0.0.7:9000/link");
        assert_eq!(loaded.pulse.confirmation_duration_ms, 250);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let path = temp_path("partial.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"link": {"server_url": "ws://host:1"}}"#).unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded.link.server_url, "ws://host:1");
        assert_eq!(loaded.link.reconnect_delay_ms, 5000);
        assert_eq!(loaded.device.device_name_filter, "MetaWear");
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn rejects_non_websocket_endpoint() {
        let path = temp_path("bad_scheme.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"link": {"server_url": "ftp://host"}}"#).unwrap();

        assert!(AppConfig::load(&path).await.is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
