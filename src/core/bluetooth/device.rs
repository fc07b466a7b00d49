//! The connected bracelet, exposed through the gateway traits

use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::{Characteristic, Device};
use futures_util::stream::BoxStream;
use log::{debug, warn};

use crate::core::bluetooth::commands::{CommandExecutor, CommandSender, DeviceCommand};
use crate::core::bluetooth::connection::BluestCommandSender;
use crate::core::bluetooth::constants::{
    READ_RESPONSE_TIMEOUT_MS, UUID_FIRMWARE_REVISION, UUID_HARDWARE_REVISION,
    UUID_MANUFACTURER_NAME, UUID_MODEL_NUMBER, UUID_SERIAL_NUMBER,
};
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::types::ConnectedDeviceState;
use crate::core::gateway::{ActuationGateway, DeviceInfo, DeviceReader, IndicatorColor};

pub struct MetaWearDevice {
    device: Device,
    executor: CommandExecutor<BluestCommandSender>,
    notify_characteristic: Characteristic,
    notifications: NotificationHandler,
    battery_characteristic: Option<Characteristic>,
    info_characteristics: Vec<Characteristic>,
}

impl MetaWearDevice {
    /// Wraps the resolved handles and starts listening for module frames.
    pub fn new(state: ConnectedDeviceState) -> Self {
        let notifications = NotificationHandler::new();
        notifications.setup_notifications(state.notify_characteristic.clone());

        Self {
            device: state.device,
            executor: CommandExecutor::new(BluestCommandSender::new(state.command_characteristic)),
            notify_characteristic: state.notify_characteristic,
            notifications,
            battery_characteristic: state.battery_characteristic,
            info_characteristics: state.info_characteristics,
        }
    }

    async fn read_info_string(&self, uuid: bluest::Uuid) -> Option<String> {
        let characteristic = self.info_characteristics.iter().find(|c| c.uuid() == uuid)?;
        match characteristic.read().await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\0')
                    .trim()
                    .to_string();
                debug!("Read {}: {:?}", uuid, text);
                Some(text)
            }
            Err(e) => {
                warn!("Failed to read device information {}: {}", uuid, e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl DeviceReader for MetaWearDevice {
    fn identifier(&self) -> String {
        self.device.id().to_string()
    }

    fn name(&self) -> Option<String> {
        self.device.name().ok()
    }

    async fn read_device_info(&self) -> Result<DeviceInfo> {
        if self.info_characteristics.is_empty() {
            return Err(anyhow!("Device information service not available"));
        }
        Ok(DeviceInfo {
            manufacturer_name: self.read_info_string(UUID_MANUFACTURER_NAME).await,
            serial_number: self.read_info_string(UUID_SERIAL_NUMBER).await,
            hardware_revision: self.read_info_string(UUID_HARDWARE_REVISION).await,
            firmware_revision: self.read_info_string(UUID_FIRMWARE_REVISION).await,
            model_number: self.read_info_string(UUID_MODEL_NUMBER).await,
        })
    }

    async fn read_battery_level(&self) -> Result<u8> {
        let characteristic = self
            .battery_characteristic
            .as_ref()
            .ok_or_else(|| anyhow!("Battery characteristic not available"))?;
        let battery_data = characteristic.read().await?;
        battery_data
            .first()
            .copied()
            .ok_or_else(|| anyhow!("No battery level data received"))
    }

    async fn read_signal_strength(&self) -> Result<i16> {
        Ok(self.device.rssi().await?)
    }

    async fn read_switch(&self) -> Result<bool> {
        let receiver = self.notifications.subscribe();
        self.executor
            .sender()
            .send_command(DeviceCommand::SwitchRead)
            .await?;
        NotificationHandler::wait_for(
            receiver,
            Duration::from_millis(READ_RESPONSE_TIMEOUT_MS),
            |frame| frame.switch_state(true),
        )
        .await
    }

    /// The OS drops characteristic subscriptions with the link, so the
    /// notification pump is reinstalled on every connect.
    async fn resume(&self) -> Result<()> {
        debug!(
            "Re-arming notifications (pump was {})",
            if self.notifications.is_listening() { "running" } else { "stopped" }
        );
        self.notifications
            .setup_notifications(self.notify_characteristic.clone());
        Ok(())
    }

    async fn subscribe_switch(&self) -> Result<BoxStream<'static, bool>> {
        let stream = self.notifications.filtered(|frame| frame.switch_state(false));
        self.executor
            .sender()
            .send_command(DeviceCommand::SwitchNotify(true))
            .await?;
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl ActuationGateway for MetaWearDevice {
    async fn actuate_haptic(&self, intensity: f32, duration_ms: u16) -> Result<()> {
        self.executor.actuate_haptic(intensity, duration_ms).await
    }

    async fn set_indicator_color(&self, color: IndicatorColor, intensity: f32) -> Result<()> {
        self.executor.set_indicator_color(color, intensity).await
    }

    async fn set_indicator_on(&self, on: bool) -> Result<()> {
        self.executor.set_indicator_on(on).await
    }

    async fn flash_indicator(
        &self,
        color: IndicatorColor,
        intensity: f32,
        flashes: u8,
    ) -> Result<()> {
        self.executor.flash_indicator(color, intensity, flashes).await
    }
}
