//! Presence Store: the live set of peers on the LAN.
//!
//! One map behind one RwLock. Every mutation takes the write lock and
//! publishes its event on the broadcast channel before releasing it, so the
//! event stream is in mutation order and `subscribe()` (which holds the read
//! lock) returns a snapshot that is exactly the state the returned receiver
//! starts from.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;

use linkbeam_core::Peer;

/// Per-subscriber event buffer. A subscriber that falls further behind than
/// this is resynchronised from a fresh snapshot.
pub const EVENT_BUFFER: usize = 256;

/// An incremental presence change.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// First announcement from an unknown device_id.
    Discovered(Peer),
    /// A known peer re-announced with a different name, ip or port.
    Updated(Peer),
    /// Expired or left.
    Lost { device_id: String },
}

impl PresenceEvent {
    pub fn device_id(&self) -> &str {
        match self {
            PresenceEvent::Discovered(p) | PresenceEvent::Updated(p) => &p.device_id,
            PresenceEvent::Lost { device_id } => device_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Only last_seen moved. No event.
    Refreshed,
}

/// Discovery counters. Malformed datagrams are only ever counted and logged.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    announcements: AtomicU64,
    malformed: AtomicU64,
}

impl DiscoveryStats {
    pub fn record_announcement(&self) {
        self.announcements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn announcements(&self) -> u64 {
        self.announcements.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Shared handle to the peer set. Cheap to clone.
#[derive(Clone)]
pub struct PresenceStore {
    peers: Arc<RwLock<HashMap<String, Peer>>>,
    events: broadcast::Sender<PresenceEvent>,
    stats: Arc<DiscoveryStats>,
}

impl Default for PresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            events,
            stats: Arc::new(DiscoveryStats::default()),
        }
    }

    /// Insert a new peer or refresh a known one, keyed by device_id.
    pub fn upsert(&self, peer: Peer) -> UpsertOutcome {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);

        let outcome = match peers.get(&peer.device_id) {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing.differs_from(&peer) => UpsertOutcome::Updated,
            Some(_) => UpsertOutcome::Refreshed,
        };

        match outcome {
            UpsertOutcome::Inserted => {
                tracing::info!(
                    device_id = %peer.device_id,
                    device_name = %peer.device_name,
                    addr = %peer.api_addr(),
                    "peer discovered"
                );
                let _ = self.events.send(PresenceEvent::Discovered(peer.clone()));
            }
            UpsertOutcome::Updated => {
                tracing::info!(
                    device_id = %peer.device_id,
                    addr = %peer.api_addr(),
                    "peer record changed"
                );
                let _ = self.events.send(PresenceEvent::Updated(peer.clone()));
            }
            UpsertOutcome::Refreshed => {
                tracing::trace!(device_id = %peer.device_id, "peer refreshed");
            }
        }

        peers.insert(peer.device_id.clone(), peer);
        outcome
    }

    /// Remove every peer silent for longer than `ttl` as of `now`.
    /// Returns the removed device ids; one Lost event is published per id.
    pub fn expire_sweep(&self, now: SystemTime, ttl: Duration) -> Vec<String> {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);

        let expired: Vec<String> = peers
            .values()
            .filter(|p| p.is_expired(now, ttl))
            .map(|p| p.device_id.clone())
            .collect();

        for device_id in &expired {
            peers.remove(device_id);
            tracing::info!(device_id = %device_id, ttl_secs = ttl.as_secs(), "peer expired");
            let _ = self.events.send(PresenceEvent::Lost {
                device_id: device_id.clone(),
            });
        }

        expired
    }

    /// Explicit leave. Returns false when the peer was not known.
    pub fn remove(&self, device_id: &str) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        if peers.remove(device_id).is_none() {
            return false;
        }
        tracing::info!(device_id, "peer left");
        let _ = self.events.send(PresenceEvent::Lost {
            device_id: device_id.to_string(),
        });
        true
    }

    /// Current peer set, ordered by name then id.
    pub fn snapshot(&self) -> Vec<Peer> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        sorted(peers.values().cloned().collect())
    }

    /// A snapshot plus a receiver positioned exactly after it.
    pub fn subscribe(&self) -> (Vec<Peer>, broadcast::Receiver<PresenceEvent>) {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        let rx = self.events.subscribe();
        (sorted(peers.values().cloned().collect()), rx)
    }

    pub fn get(&self, device_id: &str) -> Option<Peer> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        peers.get(device_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &DiscoveryStats {
        &self.stats
    }
}

fn sorted(mut peers: Vec<Peer>) -> Vec<Peer> {
    peers.sort_by(|a, b| {
        a.device_name
            .cmp(&b.device_name)
            .then_with(|| a.device_id.cmp(&b.device_id))
    });
    peers
}
