//! Constants used by the bluetooth layer
//! GATT UUIDs of the bracelet and the MetaWear command protocol identifiers.

use uuid::Uuid;

/// Standard Bluetooth Service UUIDs
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const UUID_MODEL_NUMBER: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);
pub const UUID_SERIAL_NUMBER: Uuid = Uuid::from_u128(0x00002a25_0000_1000_8000_00805f9b34fb);
pub const UUID_FIRMWARE_REVISION: Uuid = Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb);
pub const UUID_HARDWARE_REVISION: Uuid = Uuid::from_u128(0x00002a27_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// The MetaWear command service
pub const UUID_METAWEAR_SERVICE: Uuid = Uuid::from_u128(0x326a9000_85cb_9195_d9dd_464cfbbae75a);

/// Characteristic commands are written to
pub const UUID_METAWEAR_COMMAND_CHAR: Uuid = Uuid::from_u128(0x326a9001_85cb_9195_d9dd_464cfbbae75a);

/// Characteristic module responses and notifications arrive on
pub const UUID_METAWEAR_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x326a9006_85cb_9195_d9dd_464cfbbae75a);

/// MetaWear module ids
pub const MODULE_SWITCH: u8 = 0x01;
pub const MODULE_LED: u8 = 0x02;
pub const MODULE_HAPTIC: u8 = 0x08;

/// Register ids within their module
pub const SWITCH_STATE: u8 = 0x01;
pub const LED_PLAY: u8 = 0x01;
pub const LED_STOP: u8 = 0x02;
pub const LED_CONFIG: u8 = 0x03;
pub const HAPTIC_PULSE: u8 = 0x01;

/// High bit set on a register id turns the command into a read
pub const READ_FLAG: u8 = 0x80;

/// Motor duty cycle corresponding to full intensity
pub const HAPTIC_MAX_DUTY_CYCLE: u8 = 248;

/// Largest LED intensity the firmware accepts
pub const LED_MAX_INTENSITY: u8 = 31;

/// How long to wait for a register read to be answered, in milliseconds
pub const READ_RESPONSE_TIMEOUT_MS: u64 = 2000;

/// Minimum RSSI for a scanned device to be considered
pub const MIN_RSSI_THRESHOLD: i16 = -90;
