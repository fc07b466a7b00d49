//! In-crate test doubles for the hardware collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::gateway::{ActuationGateway, DeviceInfo, DeviceReader, IndicatorColor};
use crate::core::link::{Connection, FrameTransport};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Haptic { intensity: f32, duration_ms: u16 },
    IndicatorColor { color: IndicatorColor, intensity: f32 },
    IndicatorOn(bool),
    Flash { color: IndicatorColor, flashes: u8 },
}

/// Records every actuation together with the (paused) clock time it arrived.
pub struct RecordingGateway {
    start: Instant,
    calls: Mutex<Vec<(Duration, GatewayCall)>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: GatewayCall) {
        let at = self.start.elapsed();
        self.calls.lock().unwrap().push((at, call));
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Haptic calls as `(elapsed_ms, intensity, duration_ms)`.
    pub fn haptics(&self) -> Vec<(u128, f32, u16)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, call)| match call {
                GatewayCall::Haptic {
                    intensity,
                    duration_ms,
                } => Some((at.as_millis(), *intensity, *duration_ms)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ActuationGateway for RecordingGateway {
    async fn actuate_haptic(&self, intensity: f32, duration_ms: u16) -> Result<()> {
        self.record(GatewayCall::Haptic {
            intensity,
            duration_ms,
        });
        Ok(())
    }

    async fn set_indicator_color(&self, color: IndicatorColor, intensity: f32) -> Result<()> {
        self.record(GatewayCall::IndicatorColor { color, intensity });
        Ok(())
    }

    async fn set_indicator_on(&self, on: bool) -> Result<()> {
        self.record(GatewayCall::IndicatorOn(on));
        Ok(())
    }

    async fn flash_indicator(
        &self,
        color: IndicatorColor,
        _intensity: f32,
        flashes: u8,
    ) -> Result<()> {
        self.record(GatewayCall::Flash { color, flashes });
        Ok(())
    }
}

/// Scripted reader: counts reads and hands out a controllable switch stream.
pub struct FakeReader {
    pub info: DeviceInfo,
    pub battery: Mutex<Option<u8>>,
    pub rssi: Mutex<Option<i16>>,
    pub switch_on: bool,
    battery_reads: Mutex<Vec<Duration>>,
    rssi_reads: Mutex<Vec<Duration>>,
    resumes: Mutex<Vec<Duration>>,
    switch_tx: Mutex<Option<mpsc::UnboundedSender<bool>>>,
    /// Cancelled when the consumer drops the switch stream.
    pub switch_dropped: CancellationToken,
    start: Instant,
}

impl FakeReader {
    pub fn new(serial: &str) -> Self {
        Self {
            info: DeviceInfo {
                manufacturer_name: Some("MbientLab Inc".to_string()),
                serial_number: Some(serial.to_string()),
                hardware_revision: Some("0.3".to_string()),
                firmware_revision: Some("1.5.0".to_string()),
                model_number: Some("5".to_string()),
            },
            battery: Mutex::new(Some(87)),
            rssi: Mutex::new(Some(-61)),
            switch_on: false,
            battery_reads: Mutex::new(Vec::new()),
            rssi_reads: Mutex::new(Vec::new()),
            resumes: Mutex::new(Vec::new()),
            switch_tx: Mutex::new(None),
            switch_dropped: CancellationToken::new(),
            start: Instant::now(),
        }
    }

    pub fn battery_reads(&self) -> Vec<u128> {
        self.battery_reads.lock().unwrap().iter().map(Duration::as_millis).collect()
    }

    pub fn resumes(&self) -> Vec<u128> {
        self.resumes.lock().unwrap().iter().map(Duration::as_millis).collect()
    }

    pub fn rssi_reads(&self) -> Vec<u128> {
        self.rssi_reads.lock().unwrap().iter().map(Duration::as_millis).collect()
    }

    /// Pushes a switch position to the current subscriber, if any.
    pub fn press_switch(&self, on: bool) -> bool {
        match self.switch_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(on).is_ok(),
            None => false,
        }
    }
}

struct DropSignal(CancellationToken);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[async_trait::async_trait]
impl DeviceReader for FakeReader {
    fn identifier(&self) -> String {
        "fake-peripheral".to_string()
    }

    fn name(&self) -> Option<String> {
        Some("MetaWear".to_string())
    }

    async fn read_device_info(&self) -> Result<DeviceInfo> {
        Ok(self.info.clone())
    }

    async fn read_battery_level(&self) -> Result<u8> {
        self.battery_reads.lock().unwrap().push(self.start.elapsed());
        self.battery
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("battery read failed"))
    }

    async fn read_signal_strength(&self) -> Result<i16> {
        self.rssi_reads.lock().unwrap().push(self.start.elapsed());
        self.rssi.lock().unwrap().ok_or_else(|| anyhow!("rssi read failed"))
    }

    async fn read_switch(&self) -> Result<bool> {
        Ok(self.switch_on)
    }

    async fn resume(&self) -> Result<()> {
        self.resumes.lock().unwrap().push(self.start.elapsed());
        Ok(())
    }

    async fn subscribe_switch(&self) -> Result<BoxStream<'static, bool>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.switch_tx.lock().unwrap() = Some(tx);
        let signal = DropSignal(self.switch_dropped.clone());
        let stream = futures_util::stream::unfold((rx, signal), |(mut rx, signal)| async move {
            rx.recv().await.map(|on| (on, (rx, signal)))
        });
        Ok(stream.boxed())
    }
}

/// Transport whose connections are queued by the test. An attempt with
/// nothing queued is refused.
pub struct ScriptedTransport {
    start: Instant,
    stall: Arc<AtomicBool>,
    attempts: Arc<Mutex<Vec<Duration>>>,
    connections: Mutex<mpsc::UnboundedReceiver<Connection>>,
}

/// Test side of a [`ScriptedTransport`].
pub struct TransportScript {
    stall: Arc<AtomicBool>,
    attempts: Arc<Mutex<Vec<Duration>>>,
    connections: mpsc::UnboundedSender<Connection>,
}

/// Server end of one scripted connection. Dropping `inbound` closes it.
pub struct ScriptedServer {
    pub inbound: mpsc::UnboundedSender<String>,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, TransportScript) {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let stall = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                start: Instant::now(),
                stall: stall.clone(),
                attempts: attempts.clone(),
                connections: Mutex::new(rx),
            },
            TransportScript {
                stall,
                attempts,
                connections: tx,
            },
        )
    }
}

impl TransportScript {
    /// Connection attempts so far, in elapsed milliseconds.
    pub fn attempts(&self) -> Vec<u128> {
        self.attempts.lock().unwrap().iter().map(Duration::as_millis).collect()
    }

    /// Makes attempts with no accepted connection hang instead of failing.
    pub fn stall_unanswered(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    /// Lets the next attempt succeed.
    pub fn accept_next(&self) -> ScriptedServer {
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let inbound = futures_util::stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|text| (text, rx))
        })
        .boxed();
        let queued = self.connections.send(Connection {
            outbound: out_tx,
            inbound,
        });
        assert!(queued.is_ok(), "transport is gone");
        ScriptedServer {
            inbound: in_tx,
            outbound: out_rx,
        }
    }
}

impl ScriptedServer {
    pub fn received(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[async_trait::async_trait]
impl FrameTransport for ScriptedTransport {
    async fn open(&self) -> Result<Connection> {
        self.attempts.lock().unwrap().push(self.start.elapsed());
        let next = self.connections.lock().unwrap().try_recv();
        if next.is_err() && self.stall.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        next.map_err(|_| anyhow!("connection refused"))
    }
}
