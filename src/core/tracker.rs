//! Connection state tracker.
//!
//! Records every BLE state transition for the display and owns the polling
//! task that runs while the bracelet is connected. The task never touches
//! tracker state directly: it reports each read as a [`TrackerNotice`] that
//! the session actor feeds back through [`ConnectionStateTracker::apply`].
//! Each notice carries the generation of the connection that produced it, so
//! reads still in flight from an earlier connection never land on a later one.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::device_config::DeviceConfig;
use crate::core::bluetooth::ConnectionState;
use crate::core::gateway::{ActuationGateway, DeviceInfo, DeviceReader, IndicatorColor};
use crate::core::link::LinkStatus;

/// Results reported by the polling task.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerNotice {
    /// The post-connect descriptor read finished; `None` if it failed.
    DescriptorRead(Option<DeviceInfo>),
    Battery(u8),
    Signal(i16),
    Switch(bool),
}

/// A notice tagged with the connection generation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerReport {
    pub generation: u64,
    pub notice: TrackerNotice,
}

/// Sending half handed to read tasks, stamped with their generation.
#[derive(Clone)]
struct NoticeSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TrackerReport>,
}

impl NoticeSender {
    fn send(&self, notice: TrackerNotice) -> bool {
        self.tx
            .send(TrackerReport {
                generation: self.generation,
                notice,
            })
            .is_ok()
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Everything the display shows about the bracelet and its link.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub state: ConnectionState,
    pub identifier: String,
    pub name: Option<String>,
    pub device_info: Option<DeviceInfo>,
    pub battery_percent: Option<u8>,
    pub rssi: Option<i16>,
    pub switch_on: Option<bool>,
    pub link: LinkStatus,
}

pub struct ConnectionStateTracker {
    reader: Arc<dyn DeviceReader>,
    gateway: Arc<dyn ActuationGateway>,
    notices: mpsc::UnboundedSender<TrackerReport>,
    /// Bumped on every entry into `Connected`.
    generation: u64,
    battery_interval: Duration,
    rssi_interval: Duration,
    state: ConnectionState,
    device_info: Option<DeviceInfo>,
    battery_percent: Option<u8>,
    rssi: Option<i16>,
    switch_on: Option<bool>,
    poll_token: Option<CancellationToken>,
}

impl ConnectionStateTracker {
    pub fn new(
        reader: Arc<dyn DeviceReader>,
        gateway: Arc<dyn ActuationGateway>,
        config: &DeviceConfig,
        notices: mpsc::UnboundedSender<TrackerReport>,
    ) -> Self {
        Self {
            reader,
            gateway,
            notices,
            generation: 0,
            battery_interval: config.battery_poll_interval(),
            rssi_interval: config.rssi_poll_interval(),
            state: ConnectionState::Disconnected,
            device_info: None,
            battery_percent: None,
            rssi: None,
            switch_on: None,
            poll_token: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.poll_token.is_some()
    }

    /// Serial number reported to the server; falls back to the platform
    /// identifier when the descriptor could not be read.
    pub fn device_serial(&self) -> String {
        self.device_info
            .as_ref()
            .and_then(|info| info.serial_number.clone())
            .filter(|serial| !serial.is_empty())
            .unwrap_or_else(|| self.reader.identifier())
    }

    /// Records a transition. Entering `Connected` starts the post-connect
    /// reads and the periodic polls; leaving it cancels them.
    pub fn on_state_changed(&mut self, new_state: ConnectionState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        info!("Device state {} -> {}", old_state, new_state);

        if new_state == ConnectionState::Connected {
            self.start_polling();
        } else if old_state == ConnectionState::Connected {
            self.stop_polling();
        }
    }

    /// Folds a polling result into the tracked values. Results that arrive
    /// after the device left `Connected`, or that belong to an earlier
    /// connection, are discarded. Returns whether the notice was applied.
    pub fn apply(&mut self, report: TrackerReport) -> bool {
        let TrackerReport { generation, notice } = report;
        if self.state != ConnectionState::Connected {
            debug!("Discarding late {:?}", notice);
            return false;
        }
        if generation != self.generation {
            debug!(
                "Discarding {:?} from connection {} (current {})",
                notice, generation, self.generation
            );
            return false;
        }
        match notice {
            TrackerNotice::DescriptorRead(info) => {
                if info.is_some() {
                    self.device_info = info;
                }
            }
            TrackerNotice::Battery(percent) => self.battery_percent = Some(percent),
            TrackerNotice::Signal(rssi) => self.rssi = Some(rssi),
            TrackerNotice::Switch(on) => {
                self.switch_on = Some(on);
                self.drive_indicator(on);
            }
        }
        true
    }

    /// One-shot battery read outside the regular cadence.
    pub fn refresh_battery(&self) {
        if self.state != ConnectionState::Connected {
            warn!("Battery refresh ignored, device is {}", self.state);
            return;
        }
        let reader = self.reader.clone();
        let notices = self.notice_sender();
        tokio::spawn(async move {
            read_battery(reader.as_ref(), &notices).await;
        });
    }

    /// One-shot RSSI read outside the regular cadence.
    pub fn refresh_signal(&self) {
        if self.state != ConnectionState::Connected {
            warn!("Signal refresh ignored, device is {}", self.state);
            return;
        }
        let reader = self.reader.clone();
        let notices = self.notice_sender();
        tokio::spawn(async move {
            read_signal(reader.as_ref(), &notices).await;
        });
    }

    /// Cancels the polling task and drops the switch subscription.
    pub fn stop_polling(&mut self) {
        if let Some(token) = self.poll_token.take() {
            token.cancel();
            info!("Stopped device polling");
        }
    }

    pub fn snapshot(&self, link: LinkStatus) -> DeviceSnapshot {
        DeviceSnapshot {
            state: self.state,
            identifier: self.reader.identifier(),
            name: self.reader.name(),
            device_info: self.device_info.clone(),
            battery_percent: self.battery_percent,
            rssi: self.rssi,
            switch_on: self.switch_on,
            link,
        }
    }

    fn notice_sender(&self) -> NoticeSender {
        NoticeSender {
            generation: self.generation,
            tx: self.notices.clone(),
        }
    }

    fn start_polling(&mut self) {
        self.stop_polling();
        self.generation += 1;
        let token = CancellationToken::new();
        self.poll_token = Some(token.clone());

        let reader = self.reader.clone();
        let notices = self.notice_sender();
        let battery_interval = self.battery_interval;
        let rssi_interval = self.rssi_interval;
        info!(
            "Polling battery every {:?} and signal every {:?}",
            battery_interval, rssi_interval
        );

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Polling task cancelled"),
                _ = poll_device(reader, notices, battery_interval, rssi_interval) => {}
            }
        });
    }

    fn drive_indicator(&self, on: bool) {
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            let result = if on {
                gateway.set_indicator_color(IndicatorColor::Blue, 1.0).await
            } else {
                gateway.set_indicator_on(false).await
            };
            if let Err(e) = result {
                warn!("Failed to update indicator: {}", e);
            }
        });
    }
}

impl Drop for ConnectionStateTracker {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

async fn poll_device(
    reader: Arc<dyn DeviceReader>,
    notices: NoticeSender,
    battery_interval: Duration,
    rssi_interval: Duration,
) {
    if let Err(e) = reader.resume().await {
        warn!("Failed to resume device reads: {}", e);
    }

    let info = match reader.read_device_info().await {
        Ok(info) => {
            info!("Device information: {:?}", info);
            Some(info)
        }
        Err(e) => {
            warn!("Failed to read device information: {}", e);
            None
        }
    };
    if !notices.send(TrackerNotice::DescriptorRead(info)) {
        return;
    }

    read_battery(reader.as_ref(), &notices).await;
    read_signal(reader.as_ref(), &notices).await;

    match reader.read_switch().await {
        Ok(on) => {
            notices.send(TrackerNotice::Switch(on));
        }
        Err(e) => warn!("Failed to read switch: {}", e),
    }
    let mut switch = match reader.subscribe_switch().await {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Failed to subscribe to switch updates: {}", e);
            None
        }
    };
    let mut switch_open = switch.is_some();

    let start = Instant::now();
    let mut battery_tick = interval_at(start + battery_interval, battery_interval);
    let mut rssi_tick = interval_at(start + rssi_interval, rssi_interval);
    battery_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    rssi_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = battery_tick.tick() => read_battery(reader.as_ref(), &notices).await,
            _ = rssi_tick.tick() => read_signal(reader.as_ref(), &notices).await,
            update = next_switch(&mut switch), if switch_open => match update {
                Some(on) => {
                    debug!("Switch {}", if on { "pressed" } else { "released" });
                    notices.send(TrackerNotice::Switch(on));
                }
                None => {
                    warn!("Switch updates ended");
                    switch_open = false;
                }
            },
        }
        if notices.is_closed() {
            break;
        }
    }
}

async fn next_switch(switch: &mut Option<BoxStream<'static, bool>>) -> Option<bool> {
    match switch {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn read_battery(reader: &dyn DeviceReader, notices: &NoticeSender) {
    match reader.read_battery_level().await {
        Ok(percent) => {
            debug!("Battery {}%", percent);
            notices.send(TrackerNotice::Battery(percent));
        }
        Err(e) => warn!("Battery read failed: {}", e),
    }
}

async fn read_signal(reader: &dyn DeviceReader, notices: &NoticeSender) {
    match reader.read_signal_strength().await {
        Ok(rssi) => {
            debug!("RSSI {} dBm", rssi);
            notices.send(TrackerNotice::Signal(rssi));
        }
        Err(e) => warn!("Signal read failed: {}", e),
    }
}
