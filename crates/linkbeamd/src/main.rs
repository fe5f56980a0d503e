//! linkbeamd: LinkBeam LAN discovery and file-transfer daemon.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use linkbeam_api::ApiState;
use linkbeam_core::config::LinkBeamConfig;
use linkbeam_core::identity::{load_or_create_device_id, local_ip, resolve_device_name};
use linkbeam_core::LocalDevice;
use linkbeam_services::{FileCatalog, FileReceiver, PresenceStore};

mod discovery;

use discovery::{broadcast, listener};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = LinkBeamConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = LinkBeamConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LinkBeamConfig::default()
    });
    let net = config.network.clone();

    // Identity
    let device_id = load_or_create_device_id(&config.identity.device_id_path)
        .context("failed to load device id")?;
    let device = LocalDevice::new(
        device_id,
        resolve_device_name(&config.identity.device_name),
        net.api_port,
    );
    tracing::info!(
        device_id = %device.device_id,
        device_name = %device.device_name,
        ip = %local_ip(),
        api_port = net.api_port,
        "linkbeamd starting"
    );

    // Storage
    let catalog = FileCatalog::open(&config.storage.received_path).with_context(|| {
        format!(
            "failed to open received directory {}",
            config.storage.received_path.display()
        )
    })?;
    tracing::info!(path = %catalog.root().display(), "received files directory");
    let receiver = FileReceiver::new(catalog, config.storage.max_upload_bytes);
    if let Err(e) = receiver.clear_staging().await {
        tracing::warn!(error = %e, "failed to clear staging directory");
    }

    // Shared state
    let presence = PresenceStore::new();
    let state = ApiState::new(device.clone(), presence.clone(), receiver);
    let broadcast_dest = SocketAddr::from((net.broadcast_addr, net.discovery_port));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let broadcast_task = {
        let device = device.clone();
        let every = net.announce_interval();
        tokio::spawn(async move {
            if let Err(e) = broadcast::broadcast_loop(device, broadcast_dest, every).await {
                tracing::error!(error = %e, "presence broadcast failed");
            }
        })
    };

    let mut listener_task = {
        let presence = presence.clone();
        let local_id = device.device_id.clone();
        let port = net.discovery_port;
        tokio::spawn(async move {
            if let Err(e) = listener::listener_loop(presence, port, local_id).await {
                tracing::error!(error = %e, "presence listener failed");
            }
        })
    };

    let expiry_task = tokio::spawn(listener::expiry_loop(
        presence.clone(),
        net.peer_ttl(),
        net.sweep_interval(),
    ));

    let mut api_task = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let bind_addr = net.bind_addr.clone();
        let port = net.api_port;
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
            };
            if let Err(e) = linkbeam_api::serve(state, &bind_addr, port, shutdown).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Run until shutdown or a fatal task exit ──────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut api_running = true;
    tokio::select! {
        _ = shutdown_rx.recv() => {}
        _ = &mut api_task => {
            api_running = false;
            tracing::error!("API server exited");
        }
        _ = &mut listener_task => {
            tracing::error!("presence listener exited");
        }
    }

    broadcast::send_leave(&device, broadcast_dest).await;
    let _ = shutdown_tx.send(());

    broadcast_task.abort();
    listener_task.abort();
    expiry_task.abort();
    if api_running
        && tokio::time::timeout(Duration::from_secs(5), api_task)
            .await
            .is_err()
    {
        tracing::warn!("API server did not stop in time");
    }

    tracing::info!("linkbeamd stopped");
    Ok(())
}
