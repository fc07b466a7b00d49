//! Core functionality for the bracelet link
//! This module holds the BLE device layer, the server link and the session
//! that ties them together.

pub mod bluetooth;
pub mod gateway;
pub mod link;
pub mod pulse;
pub mod session;
pub mod tracker;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, ConnectionState};
pub use session::{DeviceSession, SessionHandle};
pub use tracker::DeviceSnapshot;
