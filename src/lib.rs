//! Bracelet link library
//! Bridges a MetaWear bracelet to a pulse server: the server pairs the
//! bracelet with a controller and streams haptic pulse sequences to it.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod utils;

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::link::WebSocketTransport;
use crate::core::{BluetoothManager, DeviceSession, DeviceSnapshot};

/// Finds and connects the bracelet, then runs the device session until
/// Ctrl-C.
pub async fn run(config: AppConfig) -> Result<()> {
    let endpoint = config.link.endpoint()?;
    let manager = BluetoothManager::new(config.device.clone()).await?;
    let shutdown_token = CancellationToken::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let device = tokio::select! {
        device = manager.discover(shutdown_token.clone()) => device?,
        _ = &mut ctrl_c => {
            info!("Interrupted during discovery");
            return Ok(());
        }
    };

    let (states_tx, states_rx) = mpsc::unbounded_channel();
    let bracelet = manager.connect(&device, &states_tx).await?;
    let watcher =
        manager.watch_connection(device.clone(), states_tx.clone(), shutdown_token.clone());

    let (handle, session_task) = DeviceSession::start(
        &config,
        bracelet.clone(),
        bracelet.clone(),
        states_rx,
        WebSocketTransport::new(endpoint),
    );

    let mut snapshots = handle.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Device session ended unexpectedly");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                log_snapshot(&snapshot);
            }
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!("Session shutdown: {}", e);
    }
    shutdown_token.cancel();
    let _ = watcher.await;
    if let Err(e) = manager.disconnect(&device, &states_tx).await {
        error!("Failed to disconnect bracelet: {}", e);
    }
    let _ = session_task.await;
    info!("Bracelet link stopped");
    Ok(())
}

fn log_snapshot(snapshot: &DeviceSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => info!("Device snapshot: {}", json),
        Err(e) => warn!("Failed to serialize snapshot: {}", e),
    }
}
