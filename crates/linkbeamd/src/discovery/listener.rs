//! Presence announcement listener and expiry sweep.
//!
//! Binds the discovery port on all IPv4 interfaces and feeds every valid
//! announcement into the Presence Store. Malformed datagrams are counted,
//! logged and dropped. A separate expiry task removes stale peers.

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use linkbeam_core::wire::MAX_ANNOUNCEMENT_BYTES;
use linkbeam_core::{Announcement, AnnouncementKind};
use linkbeam_services::{PresenceStore, UpsertOutcome};

/// What one datagram did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram {
    Upserted(UpsertOutcome),
    /// Explicit leave; true if the peer was known.
    Left(bool),
    Own,
    Malformed,
}

/// Listen for announcements on `port` and populate the presence store.
///
/// Runs forever, cancel by dropping the task handle.
pub async fn listener_loop(store: PresenceStore, port: u16, local_device_id: String) -> Result<()> {
    let socket = make_listener_socket(port).context("failed to create discovery listener socket")?;
    tracing::info!(port, "presence listener starting");
    receive_loop(store, socket, local_device_id).await;
    Ok(())
}

async fn receive_loop(store: PresenceStore, socket: UdpSocket, local_device_id: String) {
    // One spare byte so oversized datagrams are seen as oversized, not truncated.
    let mut buf = vec![0u8; MAX_ANNOUNCEMENT_BYTES + 1];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "recv_from failed");
                continue;
            }
        };
        handle_datagram(&store, &buf[..len], src.ip(), &local_device_id, SystemTime::now());
    }
}

/// Apply one received datagram to the store.
pub fn handle_datagram(
    store: &PresenceStore,
    bytes: &[u8],
    source: IpAddr,
    local_device_id: &str,
    now: SystemTime,
) -> Datagram {
    let announcement = match Announcement::decode(bytes) {
        Ok(a) => a,
        Err(e) => {
            store.stats().record_malformed();
            tracing::debug!(%source, len = bytes.len(), error = %e, "dropping malformed announcement");
            return Datagram::Malformed;
        }
    };

    if announcement.device_id == local_device_id {
        tracing::trace!("ignoring own announcement");
        return Datagram::Own;
    }
    store.stats().record_announcement();

    match announcement.kind {
        AnnouncementKind::Announce => {
            Datagram::Upserted(store.upsert(announcement.into_peer(source, now)))
        }
        AnnouncementKind::Leave => Datagram::Left(store.remove(&announcement.device_id)),
    }
}

/// Remove peers that have not announced within `ttl`.
///
/// Runs forever, cancel by dropping the task handle.
pub async fn expiry_loop(store: PresenceStore, ttl: Duration, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        let removed = store.expire_sweep(SystemTime::now(), ttl);
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), remaining = store.len(), "expired peers");
        }
    }
}

/// Create a UDP socket bound to the discovery port on every interface.
/// Several nodes on one host can share the port.
fn make_listener_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    #[cfg(unix)]
    socket.set_reuse_port(true).context("SO_REUSEPORT")?;
    socket.set_broadcast(true).context("SO_BROADCAST")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind_addr.into()).context("bind()")?;

    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}
