//! Discovery wire format.
//!
//! One announcement is one UDP datagram carrying a JSON object:
//!
//! ```text
//! {"type":"announce","device_id":"…","device_name":"…","ip":"10.0.0.5","port":5000}
//! ```
//!
//! `type` is `announce` (periodic presence) or `leave` (sent once on
//! graceful shutdown). Receivers drop anything that fails [`Announcement::decode`].

use std::net::IpAddr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::identity::LocalDevice;
use crate::peer::Peer;

/// Largest datagram we send or accept.
pub const MAX_ANNOUNCEMENT_BYTES: usize = 4096;

const MAX_DEVICE_ID_LEN: usize = 128;
const MAX_DEVICE_NAME_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementKind {
    Announce,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(rename = "type")]
    pub kind: AnnouncementKind,
    pub device_id: String,
    pub device_name: String,
    pub ip: IpAddr,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("announcement is {0} bytes, limit is {MAX_ANNOUNCEMENT_BYTES}")]
    TooLarge(usize),
    #[error("announcement is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("announcement field `{0}` is invalid")]
    InvalidField(&'static str),
}

impl Announcement {
    pub fn announce(device: &LocalDevice, ip: IpAddr) -> Self {
        Self::build(AnnouncementKind::Announce, device, ip)
    }

    pub fn leave(device: &LocalDevice, ip: IpAddr) -> Self {
        Self::build(AnnouncementKind::Leave, device, ip)
    }

    fn build(kind: AnnouncementKind, device: &LocalDevice, ip: IpAddr) -> Self {
        Self {
            kind,
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            ip,
            port: device.port,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, AnnounceError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_ANNOUNCEMENT_BYTES {
            return Err(AnnounceError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    /// Parse and validate one datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, AnnounceError> {
        if bytes.len() > MAX_ANNOUNCEMENT_BYTES {
            return Err(AnnounceError::TooLarge(bytes.len()));
        }
        let ann: Announcement = serde_json::from_slice(bytes)?;

        if ann.device_id.is_empty()
            || ann.device_id.len() > MAX_DEVICE_ID_LEN
            || ann.device_id.chars().any(char::is_control)
        {
            return Err(AnnounceError::InvalidField("device_id"));
        }
        if ann.device_name.len() > MAX_DEVICE_NAME_LEN {
            return Err(AnnounceError::InvalidField("device_name"));
        }
        if ann.kind == AnnouncementKind::Announce && ann.port == 0 {
            return Err(AnnounceError::InvalidField("port"));
        }
        Ok(ann)
    }

    /// Turn an announcement received from `source` into a Peer record.
    ///
    /// A sender that could not work out its own address announces loopback
    /// or unspecified; the datagram source is the better answer then.
    pub fn into_peer(self, source: IpAddr, seen_at: SystemTime) -> Peer {
        let announced_unusable = self.ip.is_loopback() || self.ip.is_unspecified();
        let source_usable = !source.is_loopback() && !source.is_unspecified();
        let ip = if announced_unusable && source_usable {
            source
        } else {
            self.ip
        };

        let device_name = if self.device_name.trim().is_empty() {
            self.device_id.clone()
        } else {
            self.device_name
        };

        Peer {
            device_id: self.device_id,
            device_name,
            ip,
            port: self.port,
            last_seen: seen_at,
        }
    }
}
