//! Bluetooth connection handling for the bracelet
//! This module handles connecting to and disconnecting from the bracelet

use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::{Adapter, Characteristic, Device, Service};
use log::{debug, info, warn};

use crate::core::bluetooth::commands::{CommandSender, DeviceCommand};
use crate::core::bluetooth::constants::{
    UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_DEVICE_INFORMATION_SERVICE,
    UUID_METAWEAR_COMMAND_CHAR, UUID_METAWEAR_NOTIFY_CHAR, UUID_METAWEAR_SERVICE,
};
use crate::core::bluetooth::types::ConnectedDeviceState;

/// Connection manager for the bracelet
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    max_retries: u32,
    retry_delay: Duration,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            adapter,
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// Connect to the bracelet with retry mechanism
    pub async fn connect_with_retry(&self, device: &Device) -> Result<ConnectedDeviceState> {
        let mut retry_count = 0;
        let mut last_error = None;

        while retry_count < self.max_retries {
            match self.try_connect(device).await {
                Ok(state) => {
                    info!("Successfully connected to device");
                    return Ok(state);
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", retry_count + 1, e);
                    last_error = Some(e);

                    if retry_count < self.max_retries - 1 {
                        info!("Retrying connection in {:?}...", self.retry_delay);
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
            retry_count += 1;
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to connect after {} attempts", self.max_retries)))
    }

    /// Try to connect to the bracelet and resolve its characteristics
    async fn try_connect(&self, device: &Device) -> Result<ConnectedDeviceState> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let id = device.id().to_string();
        info!("Device details - ID: {}, Name: {:?}", id, name);

        if !device.is_connected().await {
            info!("Initiating connection to {}...", id);
            self.adapter.connect_device(device).await?;
        }

        info!("Connection successful, discovering services...");
        let services = device.services().await?;
        let metawear_service = find_service(&services, UUID_METAWEAR_SERVICE).ok_or_else(|| {
            for service in &services {
                info!("Available service: {}", service.uuid());
            }
            anyhow!("MetaWear service not found: {}", UUID_METAWEAR_SERVICE)
        })?;

        let mut command_char = None;
        let mut notify_char = None;
        for characteristic in metawear_service.characteristics().await? {
            let uuid = characteristic.uuid();
            if uuid == UUID_METAWEAR_COMMAND_CHAR {
                info!("Found command characteristic: {}", uuid);
                command_char = Some(characteristic);
            } else if uuid == UUID_METAWEAR_NOTIFY_CHAR {
                info!("Found notification characteristic: {}", uuid);
                notify_char = Some(characteristic);
            }
        }

        let command_characteristic = command_char.ok_or_else(|| {
            anyhow!("Command characteristic not found: {}", UUID_METAWEAR_COMMAND_CHAR)
        })?;
        let notify_characteristic = notify_char.ok_or_else(|| {
            anyhow!("Notification characteristic not found: {}", UUID_METAWEAR_NOTIFY_CHAR)
        })?;

        let battery_characteristic = match find_service(&services, UUID_BATTERY_SERVICE) {
            Some(service) => service
                .characteristics()
                .await?
                .into_iter()
                .find(|c| c.uuid() == UUID_BATTERY_LEVEL),
            None => {
                warn!("Battery service not exposed, battery reads will fail");
                None
            }
        };

        let info_characteristics = match find_service(&services, UUID_DEVICE_INFORMATION_SERVICE) {
            Some(service) => service.characteristics().await?,
            None => {
                warn!("Device information service not exposed");
                Vec::new()
            }
        };

        info!("Connection and setup process completed successfully");
        Ok(ConnectedDeviceState {
            device: device.clone(),
            command_characteristic,
            notify_characteristic,
            battery_characteristic,
            info_characteristics,
        })
    }

    /// Disconnect from the bracelet
    pub async fn disconnect(&self, device: &Device) -> Result<()> {
        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter.disconnect_device(device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }
}

fn find_service(services: &[Service], uuid: bluest::Uuid) -> Option<Service> {
    services.iter().find(|s| s.uuid() == uuid).cloned()
}

#[derive(Clone)]
pub struct BluestCommandSender {
    command_char: Characteristic,
}

impl BluestCommandSender {
    pub fn new(command_char: Characteristic) -> Self {
        Self { command_char }
    }
}

#[async_trait::async_trait]
impl CommandSender for BluestCommandSender {
    async fn send_command(&self, command: DeviceCommand) -> Result<()> {
        let data = command.to_bytes();
        debug!("Sending command to bracelet: {:?}", command);
        self.command_char.write(&data).await?;
        Ok(())
    }
}
