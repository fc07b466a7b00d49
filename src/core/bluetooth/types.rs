//! Defines shared data structures for the Bluetooth module.

use bluest::{Characteristic, Device};
use serde::Serialize;

/// Connection state of the bracelet as reported by the BLE stack.
/// Transitions are cyclic; the device can reconnect indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Discovery,
}

impl ConnectionState {
    /// Label shown next to the device name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
            Self::Discovery => "Discovery",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Represents a discovered Bluetooth device
#[derive(Debug, Clone, Serialize)]
pub struct BluetoothDevice {
    /// The name of the device, if available
    pub name: String,
    /// The address of the device (MAC address on most platforms, may be N/A on macOS)
    pub address: String,
    /// Platform-specific unique identifier for the device
    pub id: String,
    /// The signal strength (RSSI) of the device
    pub rssi: i16,
    /// Whether the device is connected
    pub is_connected: bool,
}

/// Handles resolved during a successful connection.
#[derive(Clone)]
pub struct ConnectedDeviceState {
    /// The device handle, used for things like checking connection status or disconnecting.
    pub device: Device,
    /// The characteristic MetaWear commands are written to.
    pub command_characteristic: Characteristic,
    /// The characteristic module responses arrive on.
    pub notify_characteristic: Characteristic,
    /// Standard battery level characteristic, when exposed.
    pub battery_characteristic: Option<Characteristic>,
    /// Device Information service characteristics.
    pub info_characteristics: Vec<Characteristic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_display() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Discovery,
        ] {
            assert_eq!(state.to_string(), state.label());
        }
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
