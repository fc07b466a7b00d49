//! Bluetooth functionality for the bracelet link
//! This module handles all bluetooth operations including scanning,
//! connecting, and exchanging commands with the MetaWear bracelet.

mod commands;
mod connection;
mod constants;
mod device;
mod manager;
mod notification;
mod scanner;
mod types;

// Re-export types that should be publicly accessible
pub use commands::{CommandExecutor, CommandSender, DeviceCommand, LedPattern};
pub use connection::{BluestCommandSender, ConnectionManager};
pub use constants::*; // Re-export all constants
pub use device::MetaWearDevice;
pub use manager::{BluetoothManager, StateSender};
pub use notification::{ModuleFrame, NotificationHandler};
pub use scanner::BluetoothScanner;
pub use types::{BluetoothDevice, ConnectedDeviceState, ConnectionState};
