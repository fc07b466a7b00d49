//! Collaborator seams between the link core and the bracelet hardware.
//! The bluest-backed device implements both traits; tests swap in recorders.

use anyhow::Result;
use futures_util::stream::BoxStream;
use serde::Serialize;

/// Colours the bracelet indicator LED can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndicatorColor {
    Green,
    Red,
    Blue,
}

/// Descriptor strings read from the Device Information service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub manufacturer_name: Option<String>,
    pub serial_number: Option<String>,
    pub hardware_revision: Option<String>,
    pub firmware_revision: Option<String>,
    pub model_number: Option<String>,
}

/// Haptic and indicator primitives. Every call is fire-and-forget from the
/// core's point of view: failures are logged by the caller, never retried.
#[async_trait::async_trait]
pub trait ActuationGateway: Send + Sync {
    /// Runs the haptic motor at `intensity` (0.0..=1.0) for `duration_ms`.
    async fn actuate_haptic(&self, intensity: f32, duration_ms: u16) -> Result<()>;

    /// Lights the indicator solid in `color`.
    async fn set_indicator_color(&self, color: IndicatorColor, intensity: f32) -> Result<()>;

    /// Switches the indicator on (last pattern) or off.
    async fn set_indicator_on(&self, on: bool) -> Result<()>;

    /// Flashes the indicator `flashes` times.
    async fn flash_indicator(&self, color: IndicatorColor, intensity: f32, flashes: u8)
        -> Result<()>;
}

/// Request/response reads against the bracelet, one completion each.
#[async_trait::async_trait]
pub trait DeviceReader: Send + Sync {
    /// Platform identifier of the peripheral.
    fn identifier(&self) -> String;

    /// Advertised name, if any.
    fn name(&self) -> Option<String>;

    async fn read_device_info(&self) -> Result<DeviceInfo>;

    /// Battery charge in percent.
    async fn read_battery_level(&self) -> Result<u8>;

    /// Received signal strength in dBm.
    async fn read_signal_strength(&self) -> Result<i16>;

    /// Current position of the mechanical switch.
    async fn read_switch(&self) -> Result<bool>;

    /// Stream of switch positions, one item per press or release.
    async fn subscribe_switch(&self) -> Result<BoxStream<'static, bool>>;

    /// Re-arms whatever the reads above depend on after a reconnect.
    /// Called on every entry into `Connected`, before any read.
    async fn resume(&self) -> Result<()> {
        Ok(())
    }
}
