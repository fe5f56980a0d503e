//! The Peer record: another LinkBeam node on the LAN.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// Stable per installation. The Presence Store key.
    pub device_id: String,
    pub device_name: String,
    pub ip: IpAddr,
    /// API port the peer accepts uploads on.
    pub port: u16,
    /// When the last announcement from this peer arrived.
    #[serde(with = "unix_secs")]
    pub last_seen: SystemTime,
}

impl Peer {
    pub fn api_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Base URL of the peer's HTTP API, e.g. `http://10.0.0.5:5000/api`.
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.api_addr())
    }

    /// True when the announced identity fields differ (last_seen ignored).
    pub fn differs_from(&self, other: &Peer) -> bool {
        self.device_name != other.device_name || self.ip != other.ip || self.port != other.port
    }

    /// Has this peer been silent for longer than `ttl` as of `now`?
    pub fn is_expired(&self, now: SystemTime, ttl: Duration) -> bool {
        now.duration_since(self.last_seen)
            .map(|silent| silent > ttl)
            .unwrap_or(false)
    }
}

/// Fractional UNIX seconds for a SystemTime.
pub fn to_unix_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn from_unix_secs(secs: f64) -> SystemTime {
    if secs.is_finite() && secs > 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(secs)
    } else {
        UNIX_EPOCH
    }
}

/// Serialize SystemTime as fractional UNIX seconds.
pub mod unix_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S>(t: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(super::to_unix_secs(*t))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(super::from_unix_secs(secs))
    }
}
