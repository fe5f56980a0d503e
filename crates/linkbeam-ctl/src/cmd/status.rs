//! Node status and peer list.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    device_id: String,
    device_name: String,
    peers: usize,
    files: usize,
    active_transfers: usize,
    announcements_received: u64,
    malformed_announcements: u64,
}

#[derive(Deserialize)]
struct DeviceInfo {
    ip: String,
    port: u16,
}

#[derive(Deserialize)]
struct Peer {
    device_id: String,
    device_name: String,
    ip: String,
    port: u16,
    last_seen: f64,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;
    let info: DeviceInfo = get_json(&format!("{}/device/info", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  LinkBeam Node Status");
    println!("═══════════════════════════════════════");
    println!("  Device           : {} ({})", resp.device_name, resp.device_id);
    println!("  Address          : {}:{}", info.ip, info.port);
    println!("  Peers            : {}", resp.peers);
    println!("  Received files   : {}", resp.files);
    println!("  Active transfers : {}", resp.active_transfers);
    println!(
        "  Announcements    : {} ({} malformed)",
        resp.announcements_received, resp.malformed_announcements
    );

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let peers: Vec<Peer> = get_json(&format!("{}/devices", base_url(port))).await?;

    if peers.is_empty() {
        println!("No peers discovered yet.");
        return Ok(());
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    println!("═══════════════════════════════════════");
    println!("  Discovered Peers ({})", peers.len());
    println!("═══════════════════════════════════════");

    for p in &peers {
        println!("  ┌─ {}", p.device_name);
        println!("  │  id        : {}", p.device_id);
        println!("  │  addr      : {}:{}", p.ip, p.port);
        println!("  └─ last seen : {:.0}s ago", (now - p.last_seen).max(0.0));
    }

    Ok(())
}
