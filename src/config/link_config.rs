use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// WebSocket link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Endpoint of the pulse server (`ws://` or `wss://`).
    pub server_url: String,
    /// Fixed delay between a socket close and the next connection attempt.
    pub reconnect_delay_ms: u64,
    /// Longest a single connection attempt may take before it counts as closed.
    pub connect_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            server_url: "ws://127.0.0.1:5280".to_string(),
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl LinkConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parses `server_url`, rejecting anything that is not a WebSocket endpoint.
    pub fn endpoint(&self) -> Result<Url> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| anyhow!("Invalid server_url {:?}: {}", self.server_url, e))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(anyhow!(
                "Unsupported server_url scheme {:?}, expected ws or wss",
                other
            )),
        }
    }
}
