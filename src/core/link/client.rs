//! Socket transport for the link and the reconnect loop around it.

use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::stream::{BoxStream, StreamExt};
use futures_util::SinkExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::link::session::FrameSender;

/// Everything the session actor learns from the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection attempt is starting.
    Connecting,
    /// The socket is open; frames sent here go out on it.
    Opened(FrameSender),
    /// One whole inbound text frame.
    Frame(String),
    /// The socket closed, failed, or could not be opened.
    Closed { reason: String },
}

/// An open socket, reduced to whole text frames in and out.
pub struct Connection {
    pub outbound: FrameSender,
    pub inbound: BoxStream<'static, String>,
}

/// Opens sockets to the pulse server.
#[async_trait::async_trait]
pub trait FrameTransport: Send + Sync + 'static {
    async fn open(&self) -> Result<Connection>;
}

/// WebSocket transport over tokio-tungstenite.
pub struct WebSocketTransport {
    endpoint: Url,
}

impl WebSocketTransport {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }
}

#[async_trait::async_trait]
impl FrameTransport for WebSocketTransport {
    async fn open(&self) -> Result<Connection> {
        let (ws_stream, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| anyhow!("WebSocket connection to {} failed: {}", self.endpoint, e))?;
        let (mut ws_sender, ws_receiver) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        // The writer ends when every FrameSender is dropped, closing the socket.
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                debug!("Sending frame: {}", text);
                if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                    error!("Failed to send WebSocket text message: {}", e);
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!("WebSocket sender task terminated");
        });

        let inbound = ws_receiver
            .take_while(|msg| {
                let keep = match msg {
                    Ok(Message::Close(frame)) => {
                        info!("WebSocket connection closed by server: {:?}", frame);
                        false
                    }
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        false
                    }
                    Ok(_) => true,
                };
                futures_util::future::ready(keep)
            })
            .filter_map(|msg| {
                let text = match msg {
                    Ok(Message::Text(text)) => Some(text.as_str().to_string()),
                    Ok(other) => {
                        debug!("Ignoring non-text WebSocket message: {:?}", other);
                        None
                    }
                    Err(_) => None,
                };
                futures_util::future::ready(text)
            })
            .boxed();

        Ok(Connection {
            outbound: tx,
            inbound,
        })
    }
}

/// Keeps a socket to the server open for as long as the session lives,
/// reconnecting after a fixed delay whenever it closes.
pub struct LinkClient<T: FrameTransport> {
    transport: T,
    reconnect_delay: Duration,
    connect_timeout: Duration,
}

impl<T: FrameTransport> LinkClient<T> {
    pub fn new(transport: T, reconnect_delay: Duration, connect_timeout: Duration) -> Self {
        Self {
            transport,
            reconnect_delay,
            connect_timeout,
        }
    }

    /// Runs the connect/reconnect loop until `cancel_token` fires.
    pub fn spawn(
        self,
        events: mpsc::UnboundedSender<TransportEvent>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(events, cancel_token).await;
        })
    }

    async fn run(self, events: mpsc::UnboundedSender<TransportEvent>, cancel_token: CancellationToken) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            if events.send(TransportEvent::Connecting).is_err() {
                break;
            }

            let opened = tokio::select! {
                opened = timeout(self.connect_timeout, self.transport.open()) => {
                    opened.unwrap_or_else(|_| {
                        Err(anyhow!("connect timed out after {:?}", self.connect_timeout))
                    })
                }
                _ = cancel_token.cancelled() => break,
            };

            let reason = match opened {
                Ok(connection) => {
                    info!("Link socket open (attempt {})", attempt);
                    attempt = 0;
                    match self.pump(connection, &events, &cancel_token).await {
                        Some(reason) => reason,
                        None => break,
                    }
                }
                Err(e) => e.to_string(),
            };

            if events.send(TransportEvent::Closed { reason: reason.clone() }).is_err() {
                break;
            }
            info!(
                "Link closed ({}), reconnecting in {:?}",
                reason, self.reconnect_delay
            );

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = cancel_token.cancelled() => break,
            }
        }
        info!("Link client stopped");
    }

    /// Forwards inbound frames until the socket ends. Returns the close
    /// reason, or `None` when the loop should stop altogether.
    async fn pump(
        &self,
        connection: Connection,
        events: &mpsc::UnboundedSender<TransportEvent>,
        cancel_token: &CancellationToken,
    ) -> Option<String> {
        let Connection { outbound, mut inbound } = connection;
        if events.send(TransportEvent::Opened(outbound)).is_err() {
            return None;
        }

        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(text) => {
                        if events.send(TransportEvent::Frame(text)).is_err() {
                            return None;
                        }
                    }
                    None => return Some("socket closed".to_string()),
                },
                _ = cancel_token.cancelled() => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{ScriptedTransport, TransportScript};

    fn client() -> (LinkClient<ScriptedTransport>, TransportScript) {
        let (transport, script) = ScriptedTransport::new();
        (
            LinkClient::new(transport, Duration::from_secs(5), Duration::from_secs(10)),
            script,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_retry_every_five_seconds() {
        let (client, script) = client();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = client.spawn(events_tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(script.attempts(), vec![0, 5000, 10000, 15000]);

        cancel.cancel();
        handle.await.unwrap();

        let mut closes = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, TransportEvent::Closed { .. }) {
                closes += 1;
            }
        }
        assert_eq!(closes, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_flow_until_the_socket_closes_then_reconnects() {
        let (client, script) = client();
        let mut server = script.accept_next();

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        client.spawn(events_tx, cancel.clone());

        assert!(matches!(events.recv().await, Some(TransportEvent::Connecting)));
        let outbound = match events.recv().await {
            Some(TransportEvent::Opened(outbound)) => outbound,
            other => panic!("expected Opened, got {:?}", other),
        };

        server.inbound.send(r#"{"socket_id": "abc"}"#.to_string()).unwrap();
        match events.recv().await {
            Some(TransportEvent::Frame(text)) => assert_eq!(text, r#"{"socket_id": "abc"}"#),
            other => panic!("expected Frame, got {:?}", other),
        }

        outbound.send("reply".to_string()).unwrap();
        assert_eq!(server.outbound.recv().await.as_deref(), Some("reply"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(server);
        assert!(matches!(events.recv().await, Some(TransportEvent::Closed { .. })));

        // Second attempt is refused by the script and closes right away.
        assert!(matches!(events.recv().await, Some(TransportEvent::Connecting)));
        assert!(matches!(events.recv().await, Some(TransportEvent::Closed { .. })));
        assert_eq!(script.attempts(), vec![0, 7000]);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_connect_times_out_and_counts_as_a_close() {
        let (client, script) = client();
        script.stall_unanswered();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = client.spawn(events_tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(31_000)).await;
        assert_eq!(script.attempts(), vec![0, 15_000, 30_000]);

        cancel.cancel();
        handle.await.unwrap();

        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let TransportEvent::Closed { reason } = event {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons.len(), 2);
        assert!(reasons.iter().all(|r| r.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_a_pending_reconnect() {
        let (client, script) = client();
        let (events_tx, _events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = client.spawn(events_tx, cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(script.attempts(), vec![0]);
    }
}
