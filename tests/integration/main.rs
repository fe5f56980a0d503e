//! LinkBeam integration test harness.
//!
//! Every test spins up its own nodes in-process: an API server on
//! 127.0.0.1:0 with a private received directory. Discovery is not run;
//! tests introduce nodes to each other by upserting Peer records directly,
//! which is exactly what the listener does with an announcement.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use tokio::sync::oneshot;

use linkbeam_api::ApiState;
use linkbeam_core::{LocalDevice, Peer};
use linkbeam_services::{FileCatalog, FileReceiver, PresenceStore};

mod events;
mod files;
mod status;
mod transfers;

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Node {
    pub state: ApiState,
    pub addr: SocketAddr,
    pub dir: tempfile::TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Node {
    /// Start a node named `name` with a fresh received directory.
    pub async fn spawn(name: &str) -> Result<Node> {
        let dir = tempfile::tempdir()?;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let device = LocalDevice::new(format!("{name}-id"), name.to_string(), addr.port());
        let catalog = FileCatalog::open(dir.path())?;
        let receiver = FileReceiver::new(catalog, 0);
        let state = ApiState::new(device, PresenceStore::new(), receiver);

        let (tx, rx) = oneshot::channel::<()>();
        let serve_state = state.clone();
        tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = linkbeam_api::serve_on(listener, serve_state, shutdown).await {
                eprintln!("node server failed: {e}");
            }
        });

        Ok(Node {
            state,
            addr,
            dir,
            shutdown: Some(tx),
        })
    }

    pub fn id(&self) -> &str {
        &self.state.device.device_id
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/api{}", self.addr, path)
    }

    /// This node as its peers would record it.
    pub fn as_peer(&self) -> Peer {
        Peer {
            device_id: self.id().to_string(),
            device_name: self.state.device.device_name.clone(),
            ip: self.addr.ip(),
            port: self.addr.port(),
            last_seen: SystemTime::now(),
        }
    }

    /// Make `other` known to this node's presence store.
    pub fn introduce(&self, other: &Node) {
        self.state.presence.upsert(other.as_peer());
    }

    /// Names in the received directory, hidden entries excluded.
    pub fn received_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .filter(|n| !n.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn staging_count(&self) -> usize {
        std::fs::read_dir(self.dir.path().join(".incoming"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

pub async fn get_json(url: &str) -> Result<serde_json::Value> {
    let resp = reqwest::get(url).await.with_context(|| format!("GET {url}"))?;
    if !resp.status().is_success() {
        bail!("GET {url} returned {}", resp.status());
    }
    Ok(resp.json().await?)
}

pub async fn upload(node: &Node, filename: &str, data: Vec<u8>) -> Result<reqwest::Response> {
    let part = reqwest::multipart::Part::bytes(data).file_name(filename.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    Ok(reqwest::Client::new()
        .post(node.url("/upload"))
        .multipart(form)
        .send()
        .await?)
}

/// Poll a transfer on `node` until it is completed or failed.
pub async fn wait_for_transfer(node: &Node, id: &str) -> Result<serde_json::Value> {
    let url = node.url(&format!("/transfers/{id}"));
    for _ in 0..200 {
        let status = get_json(&url).await?;
        match status["state"].as_str() {
            Some("completed") | Some("failed") => return Ok(status),
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    bail!("transfer {id} did not finish")
}

/// Poll `cond` for up to five seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    cond()
}
