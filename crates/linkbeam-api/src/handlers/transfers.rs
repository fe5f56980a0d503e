//! /send, /transfers handlers: outbound sends initiated on this node.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use linkbeam_services::{AbortOutcome, TransferStatus};

use super::{transfer_error, ApiError, ApiState};

// ── /send ─────────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct SendRequest {
    pub device_id: String,
    /// Local path on this node.
    pub path: PathBuf,
}

pub async fn handle_send(
    State(state): State<ApiState>,
    Json(req): Json<SendRequest>,
) -> Result<(StatusCode, Json<TransferStatus>), ApiError> {
    let status = state
        .transfers
        .send_to_device(&state.presence, &req.device_id, &req.path)
        .await
        .map_err(transfer_error)?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

// ── /transfers ────────────────────────────────────────────────────────────────

pub async fn handle_transfers(State(state): State<ApiState>) -> Json<Vec<TransferStatus>> {
    Json(state.transfers.list())
}

pub async fn handle_transfer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<TransferStatus>, ApiError> {
    state
        .transfers
        .get(&id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("no transfer {id}")))
}

pub async fn handle_abort(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<TransferStatus>, ApiError> {
    match state.transfers.abort(&id) {
        AbortOutcome::NotFound => Err((StatusCode::NOT_FOUND, format!("no transfer {id}"))),
        AbortOutcome::AlreadyFinished => Err((
            StatusCode::CONFLICT,
            format!("transfer {id} already finished"),
        )),
        AbortOutcome::Aborted => state
            .transfers
            .get(&id)
            .map(Json)
            .ok_or((StatusCode::NOT_FOUND, format!("no transfer {id}"))),
    }
}
