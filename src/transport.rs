//! UDP transport primitives.
//!
//! Two building blocks, both with hard deadlines and scoped socket
//! ownership: a single-shot request/response exchange, and a
//! broadcast-then-collect round that keeps the receive window open for its
//! full duration instead of stopping on the first reply.
//!
//! The [`Transport`] trait is the seam between the discovery/directory
//! logic and the OS: production code uses [`UdpTransport`], tests inject a
//! scripted implementation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::error::LinkError;
use crate::protocol::{Packet, DEVICE_PORT, PACKET_SIZE};

/// A structurally valid frame together with its UDP source.
#[derive(Debug, Clone, Copy)]
pub struct Reply {
    pub packet: Packet,
    pub remote: SocketAddrV4,
}

/// UDP request/response primitives used by the locator and directory.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame to `target` and return the first structurally valid
    /// reply, or [`LinkError::Timeout`] if none arrives in time.
    async fn send_and_receive(
        &self,
        frame: &[u8; PACKET_SIZE],
        target: Ipv4Addr,
        timeout: Duration,
    ) -> Result<Reply, LinkError>;

    /// Send one frame to every target and collect all structurally valid
    /// replies arriving before the window closes. Deduplication is the
    /// caller's job.
    async fn broadcast_and_collect(
        &self,
        frame: &[u8; PACKET_SIZE],
        targets: &[Ipv4Addr],
        window: Duration,
    ) -> Result<Vec<Reply>, LinkError>;
}

/// Production transport: one ephemeral socket per call, released on every
/// exit path by drop.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    /// Port the devices listen on; configurable so tests can talk to a
    /// fake device on an ephemeral port
    pub device_port: u16,
}

impl UdpTransport {
    pub fn new() -> Self {
        UdpTransport {
            device_port: DEVICE_PORT,
        }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

// Common socket setup: non-blocking, address reuse, bound to an ephemeral
// port on all interfaces.
fn new_socket(broadcast: bool) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    socket.bind(&socket2::SockAddr::from(bind_addr))?;
    UdpSocket::from_std(socket.into())
}

fn as_v4(addr: SocketAddr) -> Option<SocketAddrV4> {
    match addr {
        SocketAddr::V4(addr) => Some(addr),
        SocketAddr::V6(_) => None,
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_and_receive(
        &self,
        frame: &[u8; PACKET_SIZE],
        target: Ipv4Addr,
        timeout: Duration,
    ) -> Result<Reply, LinkError> {
        let socket = new_socket(false)?;
        socket
            .send_to(frame, SocketAddrV4::new(target, self.device_port))
            .await?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 2 * PACKET_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout);
            }
            let (len, addr) = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await
            {
                Err(_) => return Err(LinkError::Timeout),
                Ok(result) => result?,
            };
            let Some(remote) = as_v4(addr) else {
                continue;
            };
            match Packet::decode(&buf[..len]) {
                Ok(packet) => return Ok(Reply { packet, remote }),
                Err(e) => {
                    log::debug!("Dropping malformed datagram from {}: {}", remote, e);
                }
            }
        }
    }

    async fn broadcast_and_collect(
        &self,
        frame: &[u8; PACKET_SIZE],
        targets: &[Ipv4Addr],
        window: Duration,
    ) -> Result<Vec<Reply>, LinkError> {
        let socket = new_socket(true)?;

        for target in targets {
            let addr = SocketAddrV4::new(*target, self.device_port);
            if let Err(e) = socket.send_to(frame, addr).await {
                // A single unreachable candidate must not abort the round
                log::warn!("Failed to send to {}: {}", addr, e);
            }
        }

        let deadline = Instant::now() + window;
        let mut replies = Vec::new();
        let mut buf = [0u8; 2 * PACKET_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (len, addr) = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await
            {
                Err(_) => break, // window closed
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    log::warn!("Receive error during collection round: {}", e);
                    break;
                }
            };
            let Some(remote) = as_v4(addr) else {
                continue;
            };
            match Packet::decode(&buf[..len]) {
                Ok(packet) => replies.push(Reply { packet, remote }),
                Err(e) => {
                    log::debug!("Dropping malformed datagram from {}: {}", remote, e);
                }
            }
        }
        Ok(replies)
    }
}
