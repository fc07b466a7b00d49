//! Link to the pulse server: wire messages, per-socket session state,
//! the protocol handler and the reconnecting socket client.

mod client;
mod handler;
mod messages;
mod session;

pub use client::{Connection, FrameTransport, LinkClient, TransportEvent, WebSocketTransport};
pub use handler::LinkHandler;
pub use messages::{DecodeError, InboundMessage, OutboundMessage};
pub use session::{FrameSender, LinkSession, LinkState, LinkStatus};
