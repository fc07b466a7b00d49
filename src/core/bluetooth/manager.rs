//! Bluetooth manager for the bracelet link
//! This module provides the main interface for bluetooth operations and
//! pushes every connection state change into the session as a typed event.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use bluest::{Adapter, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::device_config::DeviceConfig;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::device::MetaWearDevice;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::types::ConnectionState;

/// Push channel carrying connection state transitions.
pub type StateSender = mpsc::UnboundedSender<ConnectionState>;

/// Manages Bluetooth operations
pub struct BluetoothManager {
    adapter: Adapter,
    connection_manager: ConnectionManager,
    scanner: BluetoothScanner,
    config: DeviceConfig,
}

impl BluetoothManager {
    /// Creates a new BluetoothManager
    pub async fn new(config: DeviceConfig) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let connection_manager = ConnectionManager::new(
            adapter.clone(),
            config.max_connect_retries,
            config.connect_retry_delay(),
        );
        let scanner = BluetoothScanner::new(adapter.clone(), config.device_name_filter.clone());

        Ok(Self {
            adapter,
            connection_manager,
            scanner,
            config,
        })
    }

    /// Scans for the bracelet
    pub async fn discover(&self, cancel_token: CancellationToken) -> Result<Device> {
        self.scanner
            .find_device(self.config.scan_timeout(), cancel_token)
            .await
    }

    /// Connects to the bracelet, reporting `Connecting`, `Discovery` and
    /// finally `Connected` (or `Disconnected` on failure).
    pub async fn connect(&self, device: &Device, states: &StateSender) -> Result<Arc<MetaWearDevice>> {
        send_state(states, ConnectionState::Connecting);
        send_state(states, ConnectionState::Discovery);

        match self.connection_manager.connect_with_retry(device).await {
            Ok(connected) => {
                let bracelet = Arc::new(MetaWearDevice::new(connected));
                send_state(states, ConnectionState::Connected);
                info!("Device successfully connected.");
                Ok(bracelet)
            }
            Err(e) => {
                send_state(states, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Forwards the adapter's connection events for `device` until cancelled.
    pub fn watch_connection(
        &self,
        device: Device,
        states: StateSender,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            let mut events = match adapter.device_connection_events(&device).await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to watch connection events: {}", e);
                    return;
                }
            };

            loop {
                tokio::select! {
                    event = events.next() => {
                        let state = match event {
                            Some(ConnectionEvent::Connected) => ConnectionState::Connected,
                            Some(ConnectionEvent::Disconnected) => ConnectionState::Disconnected,
                            None => {
                                info!("Connection event stream ended");
                                break;
                            }
                        };
                        info!("Device {} is now {}", device.id(), state);
                        if states.send(state).is_err() {
                            break;
                        }
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
        })
    }

    /// Disconnects from the bracelet
    pub async fn disconnect(&self, device: &Device, states: &StateSender) -> Result<()> {
        send_state(states, ConnectionState::Disconnecting);
        let result = self.connection_manager.disconnect(device).await;
        send_state(states, ConnectionState::Disconnected);
        result
    }
}

fn send_state(states: &StateSender, state: ConnectionState) {
    if states.send(state).is_err() {
        warn!("Connection state {} dropped, session is gone", state);
    }
}
