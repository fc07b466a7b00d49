//! Notification handling for the bracelet
//! Every module response arrives on a single notify characteristic; this
//! module fans those frames out so reads and subscriptions can pick theirs.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::Characteristic;
use futures_util::stream::{self, BoxStream, StreamExt};
use log::{debug, error, info};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::core::bluetooth::constants::{MODULE_SWITCH, READ_FLAG, SWITCH_STATE};

/// Capacity of the fan-out channel; slow subscribers lose the oldest frames
const FRAME_BUFFER: usize = 64;

/// A raw module frame: `[module, register, payload...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFrame(pub Vec<u8>);

impl ModuleFrame {
    pub fn module(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub fn register(&self) -> Option<u8> {
        self.0.get(1).copied()
    }

    pub fn payload(&self) -> &[u8] {
        self.0.get(2..).unwrap_or(&[])
    }

    /// Switch position carried by a switch notification or read response.
    pub fn switch_state(&self, read_response: bool) -> Option<bool> {
        let register = if read_response {
            SWITCH_STATE | READ_FLAG
        } else {
            SWITCH_STATE
        };
        if self.module() == Some(MODULE_SWITCH) && self.register() == Some(register) {
            self.payload().first().map(|value| *value != 0)
        } else {
            None
        }
    }
}

/// Notification handler for module frames
pub struct NotificationHandler {
    frames: broadcast::Sender<ModuleFrame>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationHandler {
    /// Create a new NotificationHandler
    pub fn new() -> Self {
        let (frames, _) = broadcast::channel(FRAME_BUFFER);
        Self {
            frames,
            task: Mutex::new(None),
        }
    }

    /// Set up notifications on the bracelet's notify characteristic,
    /// replacing any earlier pump. Open subscriptions carry over.
    pub fn setup_notifications(&self, notify_char: Characteristic) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.take() {
            previous.abort();
            debug!("Replacing notification task");
        }
        info!("Subscribing to notifications...");
        let frames = self.frames.clone();
        *task = Some(tokio::spawn(async move {
            Self::process_notifications(notify_char, frames).await;
        }));
    }

    /// Stops the notification task. Subscriptions stay open but go quiet
    /// until the next `setup_notifications`.
    pub fn stop_notifications(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = task.take() {
            task.abort();
            info!("Notification task stopped");
        }
    }

    /// True while a notification pump is installed and still running.
    pub fn is_listening(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModuleFrame> {
        self.frames.subscribe()
    }

    /// Waits for the first frame `extract` accepts, up to `timeout`.
    ///
    /// The receiver must be created before the request is written so the
    /// response cannot slip past.
    pub async fn wait_for<T, F>(
        mut receiver: broadcast::Receiver<ModuleFrame>,
        timeout: Duration,
        extract: F,
    ) -> Result<T>
    where
        F: Fn(&ModuleFrame) -> Option<T>,
    {
        let wait = async {
            loop {
                match receiver.recv().await {
                    Ok(frame) => {
                        if let Some(value) = extract(&frame) {
                            return Ok(value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Response wait lagged, {} frames skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(anyhow!("Notification stream closed"));
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| anyhow!("No response within {:?}", timeout))?
    }

    /// Stream of the values `extract` accepts, for as long as frames arrive.
    pub fn filtered<T, F>(&self, extract: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(&ModuleFrame) -> Option<T> + Send + 'static,
    {
        stream::unfold((self.frames.subscribe(), extract), |(mut receiver, extract)| async move {
            loop {
                match receiver.recv().await {
                    Ok(frame) => {
                        if let Some(value) = extract(&frame) {
                            return Some((value, (receiver, extract)));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Subscription lagged, {} frames skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    /// Process notifications from the bracelet
    async fn process_notifications(
        notify_char: Characteristic,
        frames: broadcast::Sender<ModuleFrame>,
    ) {
        info!("Listening for bracelet notifications...");

        match notify_char.notify().await {
            Ok(mut notification_stream) => {
                while let Some(result) = notification_stream.next().await {
                    match result {
                        Ok(value) => {
                            debug!("Received module frame: {:02x?}", value);
                            if value.len() < 2 {
                                error!("Unknown data: {:?}", value);
                                continue;
                            }
                            // no subscribers is fine
                            let _ = frames.send(ModuleFrame(value));
                        }
                        Err(e) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
            }
        }

        info!("Notification stream ended");
    }
}

impl Default for NotificationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NotificationHandler {
    fn drop(&mut self) {
        self.stop_notifications();
    }
}
