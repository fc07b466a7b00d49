//! MetaWear commands implementation
//! This module contains the commands the link sends to the bracelet and the
//! executor that turns gateway calls into command writes.

use anyhow::Result;
use log::{debug, info};

use crate::core::bluetooth::constants::{
    HAPTIC_MAX_DUTY_CYCLE, HAPTIC_PULSE, LED_CONFIG, LED_MAX_INTENSITY, LED_PLAY, LED_STOP,
    MODULE_HAPTIC, MODULE_LED, MODULE_SWITCH, READ_FLAG, SWITCH_STATE,
};
use crate::core::gateway::{ActuationGateway, IndicatorColor};

/// Timing of one LED pattern, as the firmware's config register expects it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPattern {
    pub high_intensity: u8,
    pub low_intensity: u8,
    pub rise_time_ms: u16,
    pub high_time_ms: u16,
    pub fall_time_ms: u16,
    pub pulse_duration_ms: u16,
    pub delay_time_ms: u16,
    /// 0xFF repeats forever
    pub repeat_count: u8,
}

impl LedPattern {
    /// Constant light at `intensity`.
    pub fn solid(intensity: f32) -> Self {
        let level = led_level(intensity);
        Self {
            high_intensity: level,
            low_intensity: level,
            rise_time_ms: 0,
            high_time_ms: 500,
            fall_time_ms: 0,
            pulse_duration_ms: 1000,
            delay_time_ms: 0,
            repeat_count: 0xFF,
        }
    }

    /// `flashes` short blinks at `intensity`.
    pub fn flash(intensity: f32, flashes: u8) -> Self {
        Self {
            high_intensity: led_level(intensity),
            low_intensity: 0,
            rise_time_ms: 0,
            high_time_ms: 200,
            fall_time_ms: 0,
            pulse_duration_ms: 800,
            delay_time_ms: 0,
            repeat_count: flashes,
        }
    }
}

/// Commands understood by the bracelet firmware
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    /// Run the motor at `duty_cycle` (0..=248) for `pulse_width_ms`
    Haptic { duty_cycle: u8, pulse_width_ms: u16 },
    /// Load a pattern into one LED channel
    LedConfigure { color: IndicatorColor, pattern: LedPattern },
    /// Start playing the configured patterns
    LedPlay,
    /// Stop the LED, optionally clearing the configured patterns
    LedStop { clear: bool },
    /// Enable or disable switch notifications
    SwitchNotify(bool),
    /// Ask for the current switch state
    SwitchRead,
}

impl DeviceCommand {
    /// Haptic command for a normalized intensity.
    pub fn haptic(intensity: f32, duration_ms: u16) -> Self {
        let duty = (intensity.clamp(0.0, 1.0) * HAPTIC_MAX_DUTY_CYCLE as f32).round() as u8;
        Self::Haptic {
            duty_cycle: duty,
            pulse_width_ms: duration_ms,
        }
    }

    /// Convert the command to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Haptic {
                duty_cycle,
                pulse_width_ms,
            } => {
                let width = pulse_width_ms.to_le_bytes();
                vec![MODULE_HAPTIC, HAPTIC_PULSE, *duty_cycle, width[0], width[1], 0x00]
            }
            Self::LedConfigure { color, pattern } => {
                let mut bytes = vec![MODULE_LED, LED_CONFIG, color_channel(*color), 0x02];
                bytes.push(pattern.high_intensity);
                bytes.push(pattern.low_intensity);
                for value in [
                    pattern.rise_time_ms,
                    pattern.high_time_ms,
                    pattern.fall_time_ms,
                    pattern.pulse_duration_ms,
                    pattern.delay_time_ms,
                ] {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
                bytes.push(pattern.repeat_count);
                bytes
            }
            Self::LedPlay => vec![MODULE_LED, LED_PLAY, 0x01],
            Self::LedStop { clear } => vec![MODULE_LED, LED_STOP, u8::from(*clear)],
            Self::SwitchNotify(enable) => vec![MODULE_SWITCH, SWITCH_STATE, u8::from(*enable)],
            Self::SwitchRead => vec![MODULE_SWITCH, SWITCH_STATE | READ_FLAG],
        }
    }
}

fn color_channel(color: IndicatorColor) -> u8 {
    match color {
        IndicatorColor::Green => 0,
        IndicatorColor::Red => 1,
        IndicatorColor::Blue => 2,
    }
}

fn led_level(intensity: f32) -> u8 {
    (intensity.clamp(0.0, 1.0) * LED_MAX_INTENSITY as f32).round() as u8
}

/// Command sender trait
#[async_trait::async_trait]
pub trait CommandSender: Send + Sync {
    /// Send a command to the bracelet
    async fn send_command(&self, command: DeviceCommand) -> Result<()>;
}

/// Executes gateway calls as command sequences
pub struct CommandExecutor<T: CommandSender> {
    command_sender: T,
}

impl<T: CommandSender> CommandExecutor<T> {
    /// Create a new CommandExecutor
    pub fn new(command_sender: T) -> Self {
        Self { command_sender }
    }

    pub fn sender(&self) -> &T {
        &self.command_sender
    }

    async fn play_pattern(&self, color: IndicatorColor, pattern: LedPattern) -> Result<()> {
        self.command_sender
            .send_command(DeviceCommand::LedStop { clear: true })
            .await?;
        self.command_sender
            .send_command(DeviceCommand::LedConfigure { color, pattern })
            .await?;
        self.command_sender.send_command(DeviceCommand::LedPlay).await
    }
}

#[async_trait::async_trait]
impl<T: CommandSender> ActuationGateway for CommandExecutor<T> {
    async fn actuate_haptic(&self, intensity: f32, duration_ms: u16) -> Result<()> {
        debug!("Haptic pulse: intensity {:.2}, {} ms", intensity, duration_ms);
        self.command_sender
            .send_command(DeviceCommand::haptic(intensity, duration_ms))
            .await
    }

    async fn set_indicator_color(&self, color: IndicatorColor, intensity: f32) -> Result<()> {
        info!("Indicator solid {:?} at {:.2}", color, intensity);
        self.play_pattern(color, LedPattern::solid(intensity)).await
    }

    async fn set_indicator_on(&self, on: bool) -> Result<()> {
        info!("Indicator {}", if on { "on" } else { "off" });
        let command = if on {
            DeviceCommand::LedPlay
        } else {
            DeviceCommand::LedStop { clear: true }
        };
        self.command_sender.send_command(command).await
    }

    async fn flash_indicator(
        &self,
        color: IndicatorColor,
        intensity: f32,
        flashes: u8,
    ) -> Result<()> {
        info!("Indicator flashing {:?} x{}", color, flashes);
        self.play_pattern(color, LedPattern::flash(intensity, flashes)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<DeviceCommand>>,
    }

    #[async_trait::async_trait]
    impl CommandSender for RecordingSender {
        async fn send_command(&self, command: DeviceCommand) -> Result<()> {
            self.sent.lock().unwrap().push(command);
            Ok(())
        }
    }

    #[test]
    fn haptic_encodes_duty_cycle_and_little_endian_width() {
        let bytes = DeviceCommand::haptic(1.0, 500).to_bytes();
        assert_eq!(bytes, vec![0x08, 0x01, 248, 0xF4, 0x01, 0x00]);

        let bytes = DeviceCommand::haptic(0.5, 300).to_bytes();
        assert_eq!(bytes, vec![0x08, 0x01, 124, 0x2C, 0x01, 0x00]);
    }

    #[test]
    fn haptic_intensity_is_clamped() {
        assert_eq!(
            DeviceCommand::haptic(3.0, 1),
            DeviceCommand::Haptic {
                duty_cycle: 248,
                pulse_width_ms: 1
            }
        );
    }

    #[test]
    fn led_config_layout() {
        let bytes = DeviceCommand::LedConfigure {
            color: IndicatorColor::Blue,
            pattern: LedPattern::flash(1.0, 5),
        }
        .to_bytes();

        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[..6], &[0x02, 0x03, 2, 0x02, 31, 0]);
        // high time 200 ms, pulse duration 800 ms
        assert_eq!(&bytes[8..10], &200u16.to_le_bytes());
        assert_eq!(&bytes[12..14], &800u16.to_le_bytes());
        assert_eq!(bytes[16], 5);
    }

    #[test]
    fn switch_commands() {
        assert_eq!(DeviceCommand::SwitchNotify(true).to_bytes(), vec![0x01, 0x01, 0x01]);
        assert_eq!(DeviceCommand::SwitchRead.to_bytes(), vec![0x01, 0x81]);
        assert_eq!(DeviceCommand::LedStop { clear: true }.to_bytes(), vec![0x02, 0x02, 0x01]);
    }

    #[tokio::test]
    async fn solid_color_replaces_the_current_pattern() {
        let executor = CommandExecutor::new(RecordingSender::default());
        executor
            .set_indicator_color(IndicatorColor::Blue, 1.0)
            .await
            .unwrap();

        let sent = executor.sender().sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                DeviceCommand::LedStop { clear: true },
                DeviceCommand::LedConfigure {
                    color: IndicatorColor::Blue,
                    pattern: LedPattern::solid(1.0),
                },
                DeviceCommand::LedPlay,
            ]
        );
    }

    #[tokio::test]
    async fn indicator_off_stops_and_clears() {
        let executor = CommandExecutor::new(RecordingSender::default());
        executor.set_indicator_on(false).await.unwrap();
        assert_eq!(
            executor.sender().sent.lock().unwrap().clone(),
            vec![DeviceCommand::LedStop { clear: true }]
        );
    }
}
