//! Pulse sequences and their timed playback on the bracelet motor.

mod scheduler;
mod sequence;

pub use scheduler::{PulseScheduler, ScheduledTimer};
pub use sequence::{PulseError, PulseEvent, PulseSequence};
