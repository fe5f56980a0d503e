//! HTTP API handlers: exposes node state as JSON.

pub mod device;
pub mod events;
pub mod files;
pub mod transfers;

use axum::http::StatusCode;

use linkbeam_core::LocalDevice;
use linkbeam_services::{
    CatalogError, FileCatalog, FileReceiver, PresenceStore, ReceiveError, TransferError,
    TransferManager,
};

#[derive(Clone)]
pub struct ApiState {
    /// This node's identity and API port.
    pub device: LocalDevice,
    pub presence: PresenceStore,
    pub catalog: FileCatalog,
    pub receiver: FileReceiver,
    pub transfers: TransferManager,
}

impl ApiState {
    pub fn new(device: LocalDevice, presence: PresenceStore, receiver: FileReceiver) -> Self {
        Self {
            device,
            presence,
            catalog: receiver.catalog().clone(),
            receiver,
            transfers: TransferManager::new(),
        }
    }
}

// ── Error mapping ─────────────────────────────────────────────────────────────

pub(crate) type ApiError = (StatusCode, String);

pub(crate) fn catalog_error(e: CatalogError) -> ApiError {
    match e {
        CatalogError::NotFound(name) => (StatusCode::NOT_FOUND, format!("file not found: {name}")),
        CatalogError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub(crate) fn receive_error(e: ReceiveError) -> ApiError {
    match e {
        ReceiveError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
        ReceiveError::NoFreeName(_) => (StatusCode::CONFLICT, e.to_string()),
        ReceiveError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub(crate) fn transfer_error(e: TransferError) -> ApiError {
    let status = match &e {
        TransferError::UnknownPeer(_) => StatusCode::NOT_FOUND,
        TransferError::NotAFile(_) | TransferError::Io(_) => StatusCode::BAD_REQUEST,
        TransferError::NetworkUnreachable { .. } | TransferError::Rejected { .. } => {
            StatusCode::BAD_GATEWAY
        }
        TransferError::PartialTransfer(_) | TransferError::Aborted => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use device::{handle_device_info, handle_devices, handle_health, handle_status};
pub use events::handle_events;
pub use files::{handle_download, handle_files, handle_upload};
pub use transfers::{handle_abort, handle_send, handle_transfer, handle_transfers};
