//! Link protocol state machine: socket lifecycle, handshake and dispatch of
//! decoded server messages. Owned by the session actor, so every call here
//! runs on a single writer.

use log::{debug, info, warn};

use crate::config::pulse_config::PulseConfig;
use crate::core::link::messages::{InboundMessage, OutboundMessage};
use crate::core::link::session::{FrameSender, LinkSession, LinkState, LinkStatus};
use crate::core::pulse::{PulseScheduler, PulseSequence};

pub struct LinkHandler {
    state: LinkState,
    session: Option<LinkSession>,
    scheduler: PulseScheduler,
    pulse_config: PulseConfig,
    last_message: Option<&'static str>,
    /// Cleared while the bracelet is not connected; frames still update
    /// link state but schedule nothing.
    actuation_enabled: bool,
}

impl LinkHandler {
    pub fn new(scheduler: PulseScheduler, pulse_config: PulseConfig) -> Self {
        Self {
            state: LinkState::NotConnected,
            session: None,
            scheduler,
            pulse_config,
            last_message: None,
            actuation_enabled: true,
        }
    }

    /// Gates every pulse the link would schedule on the bracelet being
    /// reachable.
    pub fn set_actuation_enabled(&mut self, enabled: bool) {
        if self.actuation_enabled != enabled {
            debug!("Link actuation {}", if enabled { "enabled" } else { "disabled" });
        }
        self.actuation_enabled = enabled;
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn session(&self) -> Option<&LinkSession> {
        self.session.as_ref()
    }

    pub fn scheduler(&mut self) -> &mut PulseScheduler {
        &mut self.scheduler
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            socket_id: self
                .session
                .as_ref()
                .and_then(|s| s.socket_id().map(str::to_string)),
            handshake_complete: self.session.as_ref().is_some_and(LinkSession::handshake_complete),
            server_linked: self.session.as_ref().is_some_and(LinkSession::server_linked),
            last_message: self.last_message.map(str::to_string),
        }
    }

    /// A connection attempt is starting.
    pub fn on_connecting(&mut self) {
        match self.state {
            LinkState::NotConnected | LinkState::Closed => {
                self.state = LinkState::Connecting;
                info!("Link connecting");
            }
            other => warn!("Ignoring connect while link is {:?}", other),
        }
    }

    /// The socket opened. The server speaks first, so nothing is sent here.
    pub fn on_open(&mut self, outbound: FrameSender, device_serial: String) {
        if self.state != LinkState::Connecting {
            warn!("Socket opened while link was {:?}", self.state);
        }
        self.state = LinkState::Open;
        self.session = Some(LinkSession::new(device_serial, outbound));
        info!("Link open, waiting for the server handshake");
    }

    /// The socket closed or failed. Session state and pending pulses go with it.
    pub fn on_closed(&mut self) {
        if matches!(self.state, LinkState::Open | LinkState::Connecting) {
            info!("Link closed");
        }
        self.state = LinkState::Closed;
        self.session = None;
        self.scheduler.cancel_all();
    }

    /// Decodes and dispatches one inbound text frame. Bad frames are logged
    /// and dropped; the session carries on.
    pub fn on_frame(&mut self, text: &str) -> Option<InboundMessage> {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping frame: {} ({:?})", e, text);
                return None;
            }
        };

        if self.session.is_none() {
            warn!("Dropping {} frame, no open session", message.kind());
            return None;
        }

        debug!("Received {} frame", message.kind());
        self.last_message = Some(message.kind());
        self.dispatch(&message);
        Some(message)
    }

    fn dispatch(&mut self, message: &InboundMessage) {
        match message {
            InboundMessage::Handshake { socket_id } => self.handle_socket_id(socket_id),
            InboundMessage::LinkStatus { linked } => self.handle_linked(*linked),
            InboundMessage::PulseBatch { pulses } if !self.actuation_enabled => {
                warn!("Dropping {} pulses, bracelet is not connected", pulses.len());
            }
            InboundMessage::PulseBatch { pulses } => {
                let scheduled = self.scheduler.schedule_raw(pulses);
                info!("Scheduled {} pulses", scheduled);
            }
            InboundMessage::Unknown { keys } => {
                debug!("Ignoring frame with unknown keys {:?}", keys);
            }
        }
    }

    fn handle_socket_id(&mut self, socket_id: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.accept_socket_id(socket_id) {
            info!("Server assigned socket id {}", socket_id);
        } else {
            debug!("Server repeated socket id {}, answering again", socket_id);
        }

        let reply = OutboundMessage::DeviceId {
            device_id: session.device_serial().to_string(),
        };
        let frame = match reply.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode handshake reply: {}", e);
                return;
            }
        };
        if session.outbound().send(frame).is_err() {
            warn!("Socket writer is gone, handshake reply not sent");
            return;
        }
        session.complete_handshake();
        info!("Handshake reply sent for device {}", session.device_serial());
    }

    fn handle_linked(&mut self, linked: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.set_server_linked(linked);
        if linked && !self.actuation_enabled {
            warn!("Server linked this device, confirmation skipped while disconnected");
        } else if linked {
            info!("Server linked this device");
            let confirmation = PulseSequence::single(
                self.pulse_config.confirmation_intensity,
                self.pulse_config.confirmation_duration_ms,
            );
            self.scheduler.schedule(&confirmation);
        } else {
            info!("Server unlinked this device");
        }
    }
}
