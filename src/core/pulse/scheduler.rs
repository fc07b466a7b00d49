//! Fire-once timers that play a pulse sequence on the actuation gateway.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::gateway::ActuationGateway;
use crate::core::pulse::{PulseEvent, PulseSequence};

/// A single pending actuation. Dropping the handle does not stop it;
/// cancel it explicitly or through [`PulseScheduler::cancel_all`].
pub struct ScheduledTimer {
    offset: Duration,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTimer {
    /// Delay from scheduling to firing.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// True until the timer has fired or been cancelled.
    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

/// Schedules pulse sequences without waiting for any of them to play.
pub struct PulseScheduler {
    gateway: Arc<dyn ActuationGateway>,
    /// Parent of every timer token; replaced after each `cancel_all`.
    cancel_token: CancellationToken,
    timers: Vec<ScheduledTimer>,
    next_id: u64,
}

impl PulseScheduler {
    pub fn new(gateway: Arc<dyn ActuationGateway>) -> Self {
        Self {
            gateway,
            cancel_token: CancellationToken::new(),
            timers: Vec::new(),
            next_id: 0,
        }
    }

    /// Decodes a raw `pulses` payload and schedules what survives validation.
    pub fn schedule_raw(&mut self, raw: &[Value]) -> usize {
        let sequence = PulseSequence::decode(raw);
        if sequence.len() < raw.len() {
            info!(
                "Pulse batch: {} of {} elements accepted",
                sequence.len(),
                raw.len()
            );
        }
        self.schedule(&sequence)
    }

    /// Arms one timer per pulse, each relative to the same starting instant.
    /// Returns the number of timers created.
    pub fn schedule(&mut self, sequence: &PulseSequence) -> usize {
        self.prune();
        let now = Instant::now();

        for event in sequence.events() {
            let offset = Duration::from_millis(event.offset_ms());
            let timer = self.spawn_timer(now + offset, offset, *event);
            self.timers.push(timer);
        }

        debug!(
            "Scheduled {} pulses spanning {} ms ({} pending)",
            sequence.len(),
            sequence.total_duration_ms(),
            self.timers.len()
        );
        sequence.len()
    }

    /// Cancels every timer that has not fired yet. Returns how many were pending.
    pub fn cancel_all(&mut self) -> usize {
        self.prune();
        let pending = self.timers.len();
        self.cancel_token.cancel();
        self.cancel_token = CancellationToken::new();
        self.timers.clear();
        if pending > 0 {
            info!("Cancelled {} pending pulses", pending);
        }
        pending
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending(&mut self) -> usize {
        self.prune();
        self.timers.len()
    }

    fn prune(&mut self) {
        self.timers.retain(ScheduledTimer::is_pending);
    }

    fn spawn_timer(&mut self, deadline: Instant, offset: Duration, event: PulseEvent) -> ScheduledTimer {
        let id = self.next_id;
        self.next_id += 1;

        let cancel_token = self.cancel_token.child_token();
        let token_for_task = cancel_token.clone();
        let gateway = self.gateway.clone();

        // Cancellation wins over a deadline that is already due.
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token_for_task.cancelled() => {
                    debug!("Pulse timer {} cancelled", id);
                }
                _ = sleep_until(deadline) => {
                    if token_for_task.is_cancelled() {
                        debug!("Pulse timer {} cancelled at its deadline", id);
                        return;
                    }
                    fire(gateway.as_ref(), id, event).await;
                }
            }
        });

        ScheduledTimer {
            offset,
            cancel_token,
            handle,
        }
    }
}

impl Drop for PulseScheduler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn fire(gateway: &dyn ActuationGateway, id: u64, event: PulseEvent) {
    if event.is_silent() {
        debug!("Pulse timer {} is silent, holding {} ms", id, event.duration_ms());
        return;
    }

    let duration_ms = u16::try_from(event.duration_ms()).unwrap_or(u16::MAX);
    debug!(
        "Pulse timer {} firing: intensity {:.2} for {} ms",
        id,
        event.intensity(),
        duration_ms
    );
    if let Err(e) = gateway.actuate_haptic(event.intensity(), duration_ms).await {
        error!("Pulse timer {} failed to actuate: {}", id, e);
    }
}
