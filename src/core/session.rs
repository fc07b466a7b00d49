//! Device session actor.
//!
//! One task owns the tracker, the link handler and the pulse scheduler.
//! BLE state changes, polling results, socket events and user commands all
//! arrive on channels and are applied here in order, so connection and link
//! state have a single writer. The display snapshot is republished through
//! a `watch` channel after every event.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::pulse_config::PulseConfig;
use crate::config::AppConfig;
use crate::core::bluetooth::ConnectionState;
use crate::core::gateway::{ActuationGateway, DeviceReader, IndicatorColor};
use crate::core::link::{FrameTransport, LinkClient, LinkHandler, TransportEvent};
use crate::core::pulse::{PulseScheduler, PulseSequence};
use crate::core::tracker::{ConnectionStateTracker, DeviceSnapshot, TrackerNotice, TrackerReport};

/// Requests a [`SessionHandle`] can make of the running session.
#[derive(Debug)]
enum SessionCommand {
    Action(ManualAction),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy)]
enum ManualAction {
    Buzz,
    FlashIndicator,
    RefreshBattery,
    RefreshSignal,
}

/// Cloneable handle onto a running [`DeviceSession`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: watch::Receiver<DeviceSnapshot>,
}

impl SessionHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.snapshot.clone()
    }

    /// Full-intensity haptic pulse.
    pub fn buzz(&self) -> Result<()> {
        self.send(SessionCommand::Action(ManualAction::Buzz))
    }

    /// Flashes the indicator blue.
    pub fn flash_indicator(&self) -> Result<()> {
        self.send(SessionCommand::Action(ManualAction::FlashIndicator))
    }

    pub fn refresh_battery(&self) -> Result<()> {
        self.send(SessionCommand::Action(ManualAction::RefreshBattery))
    }

    pub fn refresh_signal(&self) -> Result<()> {
        self.send(SessionCommand::Action(ManualAction::RefreshSignal))
    }

    /// Stops the link, the polls and every pending pulse, and waits for the
    /// session task to acknowledge.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown(done_tx))?;
        done_rx
            .await
            .map_err(|_| anyhow!("Session stopped before acknowledging shutdown"))
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Device session is not running"))
    }
}

pub struct DeviceSession<T: FrameTransport> {
    tracker: ConnectionStateTracker,
    link: LinkHandler,
    gateway: Arc<dyn ActuationGateway>,
    pulse_config: PulseConfig,
    /// Present until the link is started.
    link_client: Option<LinkClient<T>>,
    link_token: CancellationToken,
    link_task: Option<JoinHandle<()>>,
    snapshot_tx: watch::Sender<DeviceSnapshot>,
    states: mpsc::UnboundedReceiver<ConnectionState>,
    notices: mpsc::UnboundedReceiver<TrackerReport>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl<T: FrameTransport> DeviceSession<T> {
    /// Spawns the session task. `states` carries the bracelet's connection
    /// state transitions; the link to the server opens once the bracelet has
    /// connected and its descriptor has been read.
    pub fn start(
        config: &AppConfig,
        reader: Arc<dyn DeviceReader>,
        gateway: Arc<dyn ActuationGateway>,
        states: mpsc::UnboundedReceiver<ConnectionState>,
        transport: T,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (notices_tx, notices) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let tracker =
            ConnectionStateTracker::new(reader, gateway.clone(), &config.device, notices_tx);
        let link = LinkHandler::new(PulseScheduler::new(gateway.clone()), config.pulse.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(tracker.snapshot(link.status()));

        let session = Self {
            tracker,
            link,
            gateway,
            pulse_config: config.pulse.clone(),
            link_client: Some(LinkClient::new(
                transport,
                config.link.reconnect_delay(),
                config.link.connect_timeout(),
            )),
            link_token: CancellationToken::new(),
            link_task: None,
            snapshot_tx,
            states,
            notices,
            transport_tx,
            transport_rx,
            commands,
        };

        let handle = SessionHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        };
        (handle, tokio::spawn(session.run()))
    }

    async fn run(mut self) {
        info!("Device session started");
        loop {
            tokio::select! {
                Some(state) = self.states.recv() => self.on_device_state(state),
                Some(notice) = self.notices.recv() => self.on_notice(notice),
                Some(event) = self.transport_rx.recv() => self.on_transport_event(event),
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown(done)) => {
                        self.teardown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(SessionCommand::Action(action)) => self.on_action(action),
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
            }
            self.publish();
        }
        info!("Device session stopped");
    }

    fn on_device_state(&mut self, state: ConnectionState) {
        self.tracker.on_state_changed(state);
        self.link
            .set_actuation_enabled(state == ConnectionState::Connected);
        if matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        ) {
            self.link.scheduler().cancel_all();
        }
    }

    fn on_notice(&mut self, report: TrackerReport) {
        let descriptor_read = matches!(report.notice, TrackerNotice::DescriptorRead(_));
        if self.tracker.apply(report) && descriptor_read {
            self.start_link();
        }
    }

    fn start_link(&mut self) {
        let Some(client) = self.link_client.take() else {
            return;
        };
        info!(
            "Starting server link for device {}",
            self.tracker.device_serial()
        );
        self.link_task = Some(client.spawn(self.transport_tx.clone(), self.link_token.clone()));
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connecting => self.link.on_connecting(),
            TransportEvent::Opened(outbound) => {
                self.link.on_open(outbound, self.tracker.device_serial())
            }
            TransportEvent::Frame(text) => {
                self.link.on_frame(&text);
            }
            TransportEvent::Closed { reason } => {
                debug!("Socket closed: {}", reason);
                self.link.on_closed();
            }
        }
    }

    fn on_action(&mut self, action: ManualAction) {
        match action {
            ManualAction::Buzz => {
                if self.tracker.state() != ConnectionState::Connected {
                    warn!("Buzz ignored, device is {}", self.tracker.state());
                    return;
                }
                let buzz = PulseSequence::single(1.0, self.pulse_config.manual_buzz_duration_ms);
                self.link.scheduler().schedule(&buzz);
            }
            ManualAction::FlashIndicator => {
                let gateway = self.gateway.clone();
                let flashes = self.pulse_config.indicator_flashes;
                tokio::spawn(async move {
                    if let Err(e) = gateway
                        .flash_indicator(IndicatorColor::Blue, 1.0, flashes)
                        .await
                    {
                        warn!("Failed to flash indicator: {}", e);
                    }
                });
            }
            ManualAction::RefreshBattery => self.tracker.refresh_battery(),
            ManualAction::RefreshSignal => self.tracker.refresh_signal(),
        }
    }

    async fn teardown(&mut self) {
        info!("Shutting down device session");
        self.link_token.cancel();
        if let Some(task) = self.link_task.take() {
            if let Err(e) = task.await {
                warn!("Link task ended abnormally: {}", e);
            }
        }
        self.link.on_closed();
        self.tracker.stop_polling();
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.tracker.snapshot(self.link.status());
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}
