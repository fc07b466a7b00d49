use serde::{Deserialize, Serialize};

/// Settings for the synthetic pulses the link issues on its own
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Intensity of the buzz played when the server confirms the link.
    pub confirmation_intensity: f32,
    /// Duration of the confirmation buzz in milliseconds.
    pub confirmation_duration_ms: u64,
    /// Duration of the manual buzz in milliseconds (played at full intensity).
    pub manual_buzz_duration_ms: u64,
    /// Number of flashes for the manual indicator flash.
    pub indicator_flashes: u8,
}

impl Default for PulseConfig {
    fn default() -> Self {
        PulseConfig {
            confirmation_intensity: 0.5,
            confirmation_duration_ms: 500,
            manual_buzz_duration_ms: 500,
            indicator_flashes: 5,
        }
    }
}
