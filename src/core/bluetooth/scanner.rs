use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::MIN_RSSI_THRESHOLD;
use crate::core::bluetooth::types::BluetoothDevice;

pub struct BluetoothScanner {
    adapter: Adapter,
    name_filter: String,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, name_filter: impl Into<String>) -> Self {
        Self {
            adapter,
            name_filter: name_filter.into(),
        }
    }

    /// Finds the bracelet, preferring one the system is already connected to.
    pub async fn find_device(
        &self,
        timeout: Duration,
        cancel_token: CancellationToken,
    ) -> Result<Device> {
        info!("Checking for connected devices");
        for device in self.adapter.connected_devices().await? {
            if self.is_bracelet(&device) {
                self.log_device_found(&device).await;
                return Ok(device);
            }
        }
        info!("No connected bracelet detected");

        info!("Starting bluetooth scan for {:?}", self.name_filter);
        let mut scan_stream = self.adapter.scan(&[]).await?;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let device = discovered_device.device;
                            let rssi = discovered_device.rssi;
                            debug!("Found device - Device: {:?}, RSSI: {:?}", device, rssi);
                            // Only include devices with usable signal strength
                            if let Some(signal_strength) = rssi {
                                if signal_strength >= MIN_RSSI_THRESHOLD && self.is_bracelet(&device) {
                                    self.log_device_found(&device).await;
                                    return Ok(device);
                                }
                            }
                        }
                        None => {
                            return Err(anyhow!("Bluetooth scan stream has ended"));
                        }
                    }
                }
                _ = &mut deadline => {
                    return Err(anyhow!("No {:?} device found within {:?}", self.name_filter, timeout));
                }
                _ = cancel_token.cancelled() => {
                    return Err(anyhow!("Scan cancelled"));
                }
            }
        }
    }

    async fn log_device_found(&self, device: &Device) {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let id = device.id().to_string();
        let found = BluetoothDevice {
            address: extract_mac_address(&id).unwrap_or_else(|| "N/A".to_string()),
            rssi: device.rssi().await.unwrap_or(0),
            is_connected: device.is_connected().await,
            name,
            id,
        };
        info!(
            "Found bracelet: Address: {}, ID: {}, Name: {:?}, RSSI: {}, Is Connected: {}",
            found.address, found.id, found.name, found.rssi, found.is_connected
        );
    }

    /// Returns true if the advertised name contains the configured filter
    fn is_bracelet(&self, device: &Device) -> bool {
        device
            .name()
            .map(|name| matches_name(&name, &self.name_filter))
            .unwrap_or(false)
    }
}

fn matches_name(name: &str, filter: &str) -> bool {
    name.to_lowercase().contains(&filter.to_lowercase())
}

fn extract_mac_address(device_id_str: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_last_mac_in_platform_id() {
        let id = "BluetoothLE#BluetoothLE00:1a:7d:da:71:13-e4:5f:01:2b:3c:4d";
        assert_eq!(extract_mac_address(id), Some("E4:5F:01:2B:3C:4D".to_string()));
        assert_eq!(extract_mac_address("7A0F2B8C-1234-5678"), None);
    }

    #[test]
    fn name_filter_is_case_insensitive_substring() {
        assert!(matches_name("MetaWear", "metawear"));
        assert!(matches_name("Templeton MetaWear C", "MetaWear"));
        assert!(!matches_name("Gear VR Controller", "MetaWear"));
    }
}
