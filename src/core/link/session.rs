use serde::Serialize;
use tokio::sync::mpsc;

/// Outbound text frames for the currently open socket.
pub type FrameSender = mpsc::UnboundedSender<String>;

/// Lifecycle of the server socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LinkState {
    #[default]
    NotConnected,
    Connecting,
    Open,
    Closed,
}

/// State of one open socket. Never outlives the socket it belongs to.
#[derive(Debug)]
pub struct LinkSession {
    socket_id: Option<String>,
    device_serial: String,
    handshake_complete: bool,
    server_linked: bool,
    outbound: FrameSender,
}

impl LinkSession {
    pub fn new(device_serial: String, outbound: FrameSender) -> Self {
        Self {
            socket_id: None,
            device_serial,
            handshake_complete: false,
            server_linked: false,
            outbound,
        }
    }

    pub fn socket_id(&self) -> Option<&str> {
        self.socket_id.as_deref()
    }

    pub fn device_serial(&self) -> &str {
        &self.device_serial
    }

    pub fn handshake_complete(&self) -> bool {
        self.handshake_complete
    }

    pub fn server_linked(&self) -> bool {
        self.server_linked
    }

    pub fn outbound(&self) -> &FrameSender {
        &self.outbound
    }

    /// Stores `socket_id` and returns whether it differs from the current
    /// one. A new id reopens the handshake until its reply goes out; a
    /// repeated id keeps the handshake state, though it is still answered.
    pub fn accept_socket_id(&mut self, socket_id: &str) -> bool {
        if self.socket_id.as_deref() == Some(socket_id) {
            return false;
        }
        self.socket_id = Some(socket_id.to_string());
        self.handshake_complete = false;
        true
    }

    /// Marks the handshake done. Has no effect before a socket id is known.
    pub fn complete_handshake(&mut self) -> bool {
        let has_id = self.socket_id.as_deref().is_some_and(|id| !id.is_empty());
        if has_id {
            self.handshake_complete = true;
        }
        has_id
    }

    pub fn set_server_linked(&mut self, linked: bool) {
        self.server_linked = linked;
    }
}

/// What the display shows about the link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub socket_id: Option<String>,
    pub handshake_complete: bool,
    pub server_linked: bool,
    /// Kind of the last frame that decoded.
    pub last_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> LinkSession {
        let (tx, _rx) = mpsc::unbounded_channel();
        LinkSession::new("SERIAL".to_string(), tx)
    }

    #[test]
    fn handshake_requires_a_socket_id() {
        let mut session = session();
        assert!(!session.complete_handshake());
        assert!(!session.handshake_complete());

        assert!(session.accept_socket_id("abc"));
        assert!(session.complete_handshake());
        assert!(session.handshake_complete());
    }

    #[test]
    fn repeated_socket_id_is_not_new() {
        let mut session = session();
        assert!(session.accept_socket_id("abc"));
        session.complete_handshake();

        assert!(!session.accept_socket_id("abc"));
        assert!(session.handshake_complete());

        assert!(session.accept_socket_id("def"));
        assert!(!session.handshake_complete());
        assert_eq!(session.socket_id(), Some("def"));
    }
}
