//! Device identity: the stable id, display name and reachable address of this node.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::Serialize;

/// Length of a generated device id in bytes (hex-encoded on disk and on the wire).
const DEVICE_ID_BYTES: usize = 16;

/// This node as the rest of the LAN sees it.
#[derive(Debug, Clone, Serialize)]
pub struct LocalDevice {
    pub device_id: String,
    pub device_name: String,
    /// API port peers upload to.
    pub port: u16,
}

impl LocalDevice {
    pub fn new(device_id: String, device_name: String, port: u16) -> Self {
        Self {
            device_id,
            device_name,
            port,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read device id from {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write device id to {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("device id file {0} is corrupt")]
    Corrupt(PathBuf),
}

/// Load the device id stored at `path`, generating and persisting one on first run.
pub fn load_or_create_device_id(path: &Path) -> Result<String, IdentityError> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let id = text.trim();
            let valid = id.len() == DEVICE_ID_BYTES * 2 && hex::decode(id).is_ok();
            if !valid {
                return Err(IdentityError::Corrupt(path.to_path_buf()));
            }
            Ok(id.to_string())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let id = generate_device_id();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
            }
            std::fs::write(path, &id)
                .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
            Ok(id)
        }
        Err(e) => Err(IdentityError::ReadFailed(path.to_path_buf(), e)),
    }
}

pub fn generate_device_id() -> String {
    let mut bytes = [0u8; DEVICE_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Configured name, or the system hostname when the config leaves it empty.
pub fn resolve_device_name(configured: &str) -> String {
    if !configured.trim().is_empty() {
        return configured.trim().to_string();
    }
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "linkbeam-device".to_string())
}

/// The address other LAN hosts can reach us on.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface, whose address we then read back.
pub fn local_ip() -> IpAddr {
    let route_addr = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };
    route_addr().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
