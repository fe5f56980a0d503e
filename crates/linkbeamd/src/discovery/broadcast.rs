//! Presence announcement broadcast.
//!
//! Periodically sends an `announce` datagram to the IPv4 broadcast address
//! so nearby nodes can discover this one. The local address is resolved
//! again on every tick so a DHCP renewal shows up in the next announcement.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time;

use linkbeam_core::identity::local_ip;
use linkbeam_core::{Announcement, LocalDevice};

/// Broadcast this device's announcement on a regular interval.
///
/// Runs forever, cancel by dropping the task handle. Send failures are
/// logged and retried on the next tick.
pub async fn broadcast_loop(device: LocalDevice, dest: SocketAddr, every: Duration) -> Result<()> {
    let socket = make_broadcast_socket().context("failed to create broadcast socket")?;
    let mut interval = time::interval(every);

    tracing::info!(
        %dest,
        interval_secs = every.as_secs(),
        device_id = %device.device_id,
        "presence broadcast starting"
    );

    loop {
        interval.tick().await;
        let announcement = Announcement::announce(&device, local_ip());
        send(&socket, &announcement, dest).await;
    }
}

/// Tell the LAN we are going away. Best effort.
pub async fn send_leave(device: &LocalDevice, dest: SocketAddr) {
    let socket = match make_broadcast_socket() {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!(error = %e, "cannot send leave announcement");
            return;
        }
    };
    if send(&socket, &Announcement::leave(device, local_ip()), dest).await {
        tracing::info!(%dest, "leave announcement sent");
    }
}

async fn send(socket: &UdpSocket, announcement: &Announcement, dest: SocketAddr) -> bool {
    let bytes = match announcement.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "announcement not encodable");
            return false;
        }
    };
    match socket.send_to(&bytes, dest).await {
        Ok(n) => {
            tracing::trace!(bytes = n, %dest, "announcement sent");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, %dest, "announcement send failed");
            false
        }
    }
}

/// Create a UDP socket allowed to send to broadcast addresses.
fn make_broadcast_socket() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_broadcast(true).context("SO_BROADCAST")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    let any = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&any.into()).context("bind()")?;

    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}
