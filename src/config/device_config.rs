use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bracelet discovery, connection and polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Substring matched against advertised device names.
    pub device_name_filter: String,
    /// How long to scan before giving up on discovery.
    pub scan_timeout_secs: u64,
    /// Battery poll period while connected.
    pub battery_poll_secs: u64,
    /// RSSI poll period while connected.
    pub rssi_poll_secs: u64,
    /// Connection attempts before a connect is reported as failed.
    pub max_connect_retries: u32,
    /// Delay between connection attempts.
    pub connect_retry_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            device_name_filter: "MetaWear".to_string(),
            scan_timeout_secs: 10,
            battery_poll_secs: 60,
            rssi_poll_secs: 5,
            max_connect_retries: 5,
            connect_retry_delay_ms: 1000,
        }
    }
}

impl DeviceConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn battery_poll_interval(&self) -> Duration {
        Duration::from_secs(self.battery_poll_secs.max(1))
    }

    pub fn rssi_poll_interval(&self) -> Duration {
        Duration::from_secs(self.rssi_poll_secs.max(1))
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }
}
