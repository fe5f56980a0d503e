//! Transfer Sender: streams a local file to a peer's `/api/upload`.
//!
//! Every send is its own tokio task talking to the peer over its own HTTP
//! connection. Sessions live in a DashMap keyed by transfer id; progress is
//! published on a broadcast channel the event feed forwards to clients.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use futures::StreamExt;
use rand::RngCore;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_util::io::ReaderStream;

use linkbeam_core::peer::unix_secs;
use linkbeam_core::Peer;

use crate::presence::PresenceStore;
use crate::receiver::UploadReceipt;

/// Read size for the outbound body stream.
const SEND_CHUNK_SIZE: usize = 64 * 1024;

/// Progress events buffered per subscriber. Lagging subscribers skip ahead.
const PROGRESS_BUFFER: usize = 512;

/// Finished sessions kept for inspection. Older ones are forgotten.
const FINISHED_RETAINED: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }

    /// Pending → InProgress → Completed, and Failed from any live state.
    pub fn can_advance_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

/// Externally visible state of one send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub id: String,
    /// Target peer.
    pub device_id: String,
    pub filename: String,
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// bytes_sent / total_bytes, 1.0 for an empty file.
    pub progress: f64,
    pub state: TransferState,
    #[serde(with = "unix_secs")]
    pub started_at: SystemTime,
    /// Name the receiver stored the file under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn progress_fraction(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (sent as f64 / total as f64).clamp(0.0, 1.0)
}

fn whole_percent(sent: u64, total: u64) -> u8 {
    (progress_fraction(sent, total) * 100.0).floor() as u8
}

// ── Session state machine ─────────────────────────────────────────────────────

/// One outbound send. Not persisted.
#[derive(Debug, Clone)]
pub struct TransferSession {
    status: TransferStatus,
    reported_percent: Option<u8>,
}

impl TransferSession {
    pub fn new(id: String, device_id: String, filename: String, total_bytes: u64) -> Self {
        Self {
            status: TransferStatus {
                id,
                device_id,
                filename,
                bytes_sent: 0,
                total_bytes,
                progress: progress_fraction(0, total_bytes),
                state: TransferState::Pending,
                started_at: SystemTime::now(),
                remote_filename: None,
                error: None,
            },
            reported_percent: None,
        }
    }

    pub fn status(&self) -> &TransferStatus {
        &self.status
    }

    pub fn state(&self) -> TransferState {
        self.status.state
    }

    /// Move to `next` if the state machine allows it.
    pub fn advance(&mut self, next: TransferState) -> bool {
        if !self.status.state.can_advance_to(next) {
            return false;
        }
        self.status.state = next;
        true
    }

    /// Account for `n` more bytes handed to the connection.
    /// Returns true when a progress report is due.
    pub fn record_sent(&mut self, n: u64) -> bool {
        if self.status.state.is_terminal() {
            return false;
        }
        let started = self.advance(TransferState::InProgress);
        self.status.bytes_sent = self.status.bytes_sent.saturating_add(n);
        self.status.progress = progress_fraction(self.status.bytes_sent, self.status.total_bytes);

        let percent = whole_percent(self.status.bytes_sent, self.status.total_bytes);
        let due = started || self.reported_percent != Some(percent);
        if due {
            self.reported_percent = Some(percent);
        }
        due
    }

    pub fn complete(&mut self, remote_filename: String) -> bool {
        if !self.advance(TransferState::Completed) {
            return false;
        }
        self.status.bytes_sent = self.status.total_bytes;
        self.status.progress = 1.0;
        self.status.remote_filename = Some(remote_filename);
        true
    }

    pub fn fail(&mut self, reason: String) -> bool {
        if !self.advance(TransferState::Failed) {
            return false;
        }
        self.status.error = Some(reason);
        true
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("peer {0} is not known")]
    UnknownPeer(String),
    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),
    #[error("cannot reach {addr}: {reason}")]
    NetworkUnreachable { addr: SocketAddr, reason: String },
    #[error("transfer interrupted: {0}")]
    PartialTransfer(String),
    #[error("peer rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transfer aborted")]
    Aborted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    Aborted,
    AlreadyFinished,
    NotFound,
}

// ── Manager ───────────────────────────────────────────────────────────────────

struct SessionSlot {
    session: TransferSession,
    cancel: watch::Sender<bool>,
}

/// Owns every outbound session on this node. Cheap to clone.
#[derive(Clone)]
pub struct TransferManager {
    sessions: Arc<DashMap<String, SessionSlot>>,
    events: broadcast::Sender<TransferStatus>,
    client: reqwest::Client,
    finished_limit: usize,
}

impl Default for TransferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(PROGRESS_BUFFER);
        Self {
            sessions: Arc::new(DashMap::new()),
            events,
            client: reqwest::Client::new(),
            finished_limit: FINISHED_RETAINED,
        }
    }

    #[cfg(test)]
    fn with_finished_limit(finished_limit: usize) -> Self {
        Self {
            finished_limit,
            ..Self::new()
        }
    }

    /// Resolve `device_id` in the presence store and start a send to it.
    pub async fn send_to_device(
        &self,
        presence: &PresenceStore,
        device_id: &str,
        path: &Path,
    ) -> Result<TransferStatus, TransferError> {
        let peer = presence
            .get(device_id)
            .ok_or_else(|| TransferError::UnknownPeer(device_id.to_string()))?;
        self.send_file(&peer, path).await
    }

    /// Open `path` and start streaming it to `peer` in a background task.
    ///
    /// Returns the Pending status immediately; local errors (missing or
    /// unreadable file) are returned here, network errors land in the session.
    pub async fn send_file(&self, peer: &Peer, path: &Path) -> Result<TransferStatus, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(TransferError::NotAFile(path.to_path_buf()));
        }
        let total = meta.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let id = new_transfer_id();
        let session = TransferSession::new(id.clone(), peer.device_id.clone(), filename.clone(), total);
        let status = session.status().clone();
        let (cancel, cancel_rx) = watch::channel(false);
        self.sessions.insert(id.clone(), SessionSlot { session, cancel });
        self.publish(status.clone());

        tracing::info!(
            transfer_id = %id,
            device_id = %peer.device_id,
            addr = %peer.api_addr(),
            filename = %filename,
            bytes = total,
            "transfer starting"
        );

        let target = UploadTarget {
            url: format!("{}/upload", peer.api_url()),
            addr: peer.api_addr(),
        };
        tokio::spawn(self.clone().run(id, target, file, filename, total, cancel_rx));

        Ok(status)
    }

    async fn run(
        self,
        id: String,
        target: UploadTarget,
        file: tokio::fs::File,
        filename: String,
        total: u64,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let result = tokio::select! {
            r = self.upload(&id, &target, file, filename, total) => r,
            _ = cancelled(&mut cancel_rx) => Err(TransferError::Aborted),
        };

        match result {
            Ok(receipt) => {
                tracing::info!(
                    transfer_id = %id,
                    remote_filename = %receipt.filename,
                    bytes = receipt.size,
                    "transfer completed"
                );
                self.update(&id, |s| s.complete(receipt.filename));
            }
            Err(e) => {
                tracing::warn!(transfer_id = %id, addr = %target.addr, error = %e, "transfer failed");
                self.update(&id, |s| s.fail(e.to_string()));
            }
        }
    }

    async fn upload(
        &self,
        id: &str,
        target: &UploadTarget,
        file: tokio::fs::File,
        filename: String,
        total: u64,
    ) -> Result<UploadReceipt, TransferError> {
        if total == 0 {
            self.update(id, |s| s.advance(TransferState::InProgress));
        }

        let tracker = self.clone();
        let transfer_id = id.to_string();
        let body = ReaderStream::with_capacity(file, SEND_CHUNK_SIZE).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                tracker.record_sent(&transfer_id, bytes.len() as u64);
            }
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(filename);
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&target.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify(e, target.addr))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransferError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| TransferError::PartialTransfer(e.to_string()))?;
        if receipt.size != total {
            return Err(TransferError::PartialTransfer(format!(
                "peer stored {} of {} bytes",
                receipt.size, total
            )));
        }
        Ok(receipt)
    }

    fn record_sent(&self, id: &str, n: u64) {
        self.update(id, |s| s.record_sent(n));
    }

    /// Apply `f` to a session and publish its status if `f` reports a change.
    fn update(&self, id: &str, f: impl FnOnce(&mut TransferSession) -> bool) {
        let status = {
            let Some(mut slot) = self.sessions.get_mut(id) else {
                return;
            };
            if !f(&mut slot.session) {
                return;
            }
            slot.session.status().clone()
        };
        if status.state.is_terminal() {
            self.prune_finished();
        }
        self.publish(status);
    }

    /// Drop the oldest finished sessions beyond the retention limit.
    fn prune_finished(&self) {
        let mut finished: Vec<(SystemTime, String)> = self
            .sessions
            .iter()
            .filter(|slot| slot.session.state().is_terminal())
            .map(|slot| (slot.session.status().started_at, slot.key().clone()))
            .collect();
        if finished.len() <= self.finished_limit {
            return;
        }
        finished.sort();
        let excess = finished.len() - self.finished_limit;
        for (_, id) in finished.into_iter().take(excess) {
            self.sessions.remove(&id);
        }
        tracing::debug!(pruned = excess, "forgot old finished transfers");
    }

    fn publish(&self, status: TransferStatus) {
        let _ = self.events.send(status);
    }

    /// Cancel an in-flight send. Drops its connection and marks it Failed.
    pub fn abort(&self, id: &str) -> AbortOutcome {
        let status = {
            let Some(mut slot) = self.sessions.get_mut(id) else {
                return AbortOutcome::NotFound;
            };
            if !slot.session.fail(TransferError::Aborted.to_string()) {
                return AbortOutcome::AlreadyFinished;
            }
            let _ = slot.cancel.send(true);
            slot.session.status().clone()
        };
        tracing::info!(transfer_id = %id, "transfer aborted");
        self.prune_finished();
        self.publish(status);
        AbortOutcome::Aborted
    }

    pub fn get(&self, id: &str) -> Option<TransferStatus> {
        self.sessions.get(id).map(|slot| slot.session.status().clone())
    }

    /// All sessions, oldest first.
    pub fn list(&self) -> Vec<TransferStatus> {
        let mut all: Vec<TransferStatus> = self
            .sessions
            .iter()
            .map(|slot| slot.session.status().clone())
            .collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|slot| !slot.session.state().is_terminal())
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferStatus> {
        self.events.subscribe()
    }

    /// Wait until the session reaches Completed or Failed.
    #[cfg(test)]
    async fn wait(&self, id: &str) -> Option<TransferStatus> {
        let mut rx = self.subscribe();
        loop {
            let current = self.get(id)?;
            if current.state.is_terminal() {
                return Some(current);
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.get(id),
            }
        }
    }
}

struct UploadTarget {
    url: String,
    addr: SocketAddr,
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn classify(err: reqwest::Error, addr: SocketAddr) -> TransferError {
    if err.is_connect() {
        TransferError::NetworkUnreachable {
            addr,
            reason: err.to_string(),
        }
    } else {
        TransferError::PartialTransfer(err.to_string())
    }
}

fn new_transfer_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
