//! Decoding of server-supplied `[intensity, duration_ms]` pairs into a
//! sequence with cumulative start offsets.

use log::warn;
use serde_json::Value;
use thiserror::Error;

/// Why a single element of a pulse array was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum PulseError {
    #[error("element {index} is not an [intensity, duration] pair: {raw}")]
    NotAPair { index: usize, raw: String },
    #[error("element {index} has a non-numeric intensity: {raw}")]
    BadIntensity { index: usize, raw: String },
    #[error("element {index} has a duration that is not a non-negative integer: {raw}")]
    BadDuration { index: usize, raw: String },
}

/// One haptic actuation, positioned relative to the start of its sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseEvent {
    intensity: f32,
    duration_ms: u64,
    offset_ms: u64,
}

impl PulseEvent {
    /// Motor intensity, clamped into `0.0..=1.0`.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Start time relative to the first pulse of the sequence.
    pub fn offset_ms(&self) -> u64 {
        self.offset_ms
    }

    /// A zero intensity pulse only holds time; nothing is sent to the motor.
    pub fn is_silent(&self) -> bool {
        self.intensity <= 0.0
    }
}

/// Ordered pulses whose offsets are the prefix sums of the valid durations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulseSequence {
    events: Vec<PulseEvent>,
}

impl PulseSequence {
    /// Builds a sequence from already validated pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f32, u64)>,
    {
        let mut offset_ms: u64 = 0;
        let events = pairs
            .into_iter()
            .map(|(intensity, duration_ms)| {
                let event = PulseEvent {
                    intensity: clamp_intensity(intensity),
                    duration_ms,
                    offset_ms,
                };
                offset_ms = offset_ms.saturating_add(duration_ms);
                event
            })
            .collect();
        Self { events }
    }

    /// A sequence holding exactly one pulse at offset zero.
    pub fn single(intensity: f32, duration_ms: u64) -> Self {
        Self::from_pairs([(intensity, duration_ms)])
    }

    /// Decodes a raw JSON pulse array, logging and skipping bad elements.
    ///
    /// A skipped element contributes no duration, so the next valid pulse
    /// starts where the previous valid one ended.
    pub fn decode(raw: &[Value]) -> Self {
        let (sequence, errors) = Self::decode_with_errors(raw);
        for error in &errors {
            warn!("Skipping pulse: {}", error);
        }
        sequence
    }

    /// Same as [`PulseSequence::decode`] but hands the rejections back.
    pub fn decode_with_errors(raw: &[Value]) -> (Self, Vec<PulseError>) {
        let mut errors = Vec::new();
        let pairs: Vec<(f32, u64)> = raw
            .iter()
            .enumerate()
            .filter_map(|(index, value)| match parse_pair(index, value) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    errors.push(e);
                    None
                }
            })
            .collect();
        (Self::from_pairs(pairs), errors)
    }

    pub fn events(&self) -> &[PulseEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn offsets(&self) -> Vec<u64> {
        self.events.iter().map(PulseEvent::offset_ms).collect()
    }

    /// Time from the first pulse starting to the last one ending.
    pub fn total_duration_ms(&self) -> u64 {
        self.events
            .last()
            .map(|e| e.offset_ms.saturating_add(e.duration_ms))
            .unwrap_or(0)
    }
}

fn parse_pair(index: usize, value: &Value) -> Result<(f32, u64), PulseError> {
    let pair = match value.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => {
            return Err(PulseError::NotAPair {
                index,
                raw: value.to_string(),
            })
        }
    };

    let intensity = pair[0].as_f64().ok_or_else(|| PulseError::BadIntensity {
        index,
        raw: pair[0].to_string(),
    })?;
    let duration_ms = pair[1].as_u64().ok_or_else(|| PulseError::BadDuration {
        index,
        raw: pair[1].to_string(),
    })?;

    Ok((intensity as f32, duration_ms))
}

fn clamp_intensity(intensity: f32) -> f32 {
    if intensity.is_nan() {
        0.0
    } else {
        intensity.clamp(0.0, 1.0)
    }
}
