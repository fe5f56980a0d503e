//! /health, /device/info, /devices, /status handlers.

use std::net::IpAddr;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use linkbeam_core::identity::local_ip;
use linkbeam_core::Peer;

use super::{catalog_error, ApiError, ApiState};

// ── /health ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "LinkBeam".to_string(),
    })
}

// ── /device/info ──────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    pub ip: IpAddr,
    pub port: u16,
}

pub async fn handle_device_info(State(state): State<ApiState>) -> Json<DeviceInfo> {
    // Re-resolved per request so an address change shows up without a restart.
    Json(DeviceInfo {
        device_id: state.device.device_id.clone(),
        device_name: state.device.device_name.clone(),
        ip: local_ip(),
        port: state.device.port,
    })
}

// ── /devices ──────────────────────────────────────────────────────────────────

pub async fn handle_devices(State(state): State<ApiState>) -> Json<Vec<Peer>> {
    Json(state.presence.snapshot())
}

// ── /status ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub device_id: String,
    pub device_name: String,
    pub peers: usize,
    pub files: usize,
    pub active_transfers: usize,
    pub announcements_received: u64,
    pub malformed_announcements: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let files = state.catalog.list().await.map_err(catalog_error)?.len();
    let stats = state.presence.stats();

    Ok(Json(StatusResponse {
        device_id: state.device.device_id.clone(),
        device_name: state.device.device_name.clone(),
        peers: state.presence.len(),
        files,
        active_transfers: state.transfers.active_count(),
        announcements_received: stats.announcements(),
        malformed_announcements: stats.malformed(),
    }))
}
