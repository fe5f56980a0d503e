//! Event Notifier: per-client feed of presence and transfer events.
//!
//! Each attached client owns an `EventFeed` with its own broadcast
//! receivers, so a slow client only ever lags its own queue. A feed that
//! lags the presence channel is resynchronised from a fresh snapshot;
//! lagged transfer progress is simply skipped.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use linkbeam_core::Peer;

use crate::presence::{PresenceEvent, PresenceStore};
use crate::sender::{TransferManager, TransferStatus};

/// Server → client message, serialised as `{"event": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { device_id: String },
    DevicesList(Vec<Peer>),
    DeviceDiscovered(Peer),
    DeviceUpdated(Peer),
    DeviceLost { device_id: String },
    TransferProgress(TransferStatus),
}

impl From<PresenceEvent> for ServerEvent {
    fn from(event: PresenceEvent) -> Self {
        match event {
            PresenceEvent::Discovered(peer) => ServerEvent::DeviceDiscovered(peer),
            PresenceEvent::Updated(peer) => ServerEvent::DeviceUpdated(peer),
            PresenceEvent::Lost { device_id } => ServerEvent::DeviceLost { device_id },
        }
    }
}

/// Client → server message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    RequestDevices,
}

impl ClientMessage {
    /// Accepts `{"event":"request_devices"}` or the bare event name.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "request_devices" {
            return Some(ClientMessage::RequestDevices);
        }
        serde_json::from_str(text).ok()
    }
}

pub struct EventFeed {
    presence: PresenceStore,
    presence_rx: broadcast::Receiver<PresenceEvent>,
    transfer_rx: Option<broadcast::Receiver<TransferStatus>>,
    pending: VecDeque<ServerEvent>,
}

impl EventFeed {
    /// Attach a new client. The first two events are `connected` and
    /// `devices_list`.
    pub fn attach(local_device_id: &str, presence: &PresenceStore, transfers: &TransferManager) -> Self {
        let transfer_rx = transfers.subscribe();
        let (peers, presence_rx) = presence.subscribe();
        let mut pending = VecDeque::with_capacity(2);
        pending.push_back(ServerEvent::Connected {
            device_id: local_device_id.to_string(),
        });
        pending.push_back(ServerEvent::DevicesList(peers));

        Self {
            presence: presence.clone(),
            presence_rx,
            transfer_rx: Some(transfer_rx),
            pending,
        }
    }

    /// Reset this client's view with a fresh full list.
    pub fn request_devices(&mut self) {
        self.pending
            .retain(|e| !matches!(e, ServerEvent::DevicesList(_)));
        self.resync();
    }

    fn resync(&mut self) {
        let (peers, rx) = self.presence.subscribe();
        self.presence_rx = rx;
        self.pending.push_back(ServerEvent::DevicesList(peers));
    }

    /// Next event for this client. None once the presence store is gone.
    pub async fn next(&mut self) -> Option<ServerEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            tokio::select! {
                r = self.presence_rx.recv() => match r {
                    Ok(event) => return Some(event.into()),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event feed lagged, resending device list");
                        self.resync();
                    }
                    Err(RecvError::Closed) => return None,
                },
                r = recv_optional(&mut self.transfer_rx) => match r {
                    Ok(status) => return Some(ServerEvent::TransferProgress(status)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "transfer progress skipped for slow client");
                    }
                    Err(RecvError::Closed) => self.transfer_rx = None,
                },
            }
        }
    }
}

async fn recv_optional<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
