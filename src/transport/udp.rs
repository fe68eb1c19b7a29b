use crate::transport::socks5::UdpAssociation;
use crate::transport::{TransportDescriptor, TransportKind};
use anyhow::{Result, bail};
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

/// UdpTransport is an open datagram path to the STUN server, either a
/// plain socket or a SOCKS5 UDP association
pub enum UdpTransport {
    Direct(UdpSocket),
    Socks5(UdpAssociation),
}

impl UdpTransport {
    /// open binds the local wildcard endpoint and, for SOCKS5 kinds,
    /// establishes the association with the proxy
    pub async fn open(descriptor: &TransportDescriptor) -> Result<Self> {
        let transport = match (descriptor.kind(), descriptor.proxy()) {
            (TransportKind::UdpDirect, None) => {
                UdpTransport::Direct(UdpSocket::bind(descriptor.local()).await?)
            }
            (TransportKind::UdpSocks5, Some(proxy)) => {
                UdpTransport::Socks5(UdpAssociation::associate(descriptor.local(), proxy).await?)
            }
            (kind, _) => bail!("[ERR] {kind} is not a UDP transport"),
        };

        debug!("udp transport open on {}", transport.local_addr()?);
        Ok(transport)
    }

    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize> {
        match self {
            UdpTransport::Direct(socket) => Ok(socket.send_to(data, target).await?),
            UdpTransport::Socks5(association) => association.send_to(data, target).await,
        }
    }

    /// recv_from returns the payload length and the server endpoint it came from
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        match self {
            UdpTransport::Direct(socket) => Ok(socket.recv_from(buf).await?),
            UdpTransport::Socks5(association) => association.recv_from(buf).await,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        match self {
            UdpTransport::Direct(socket) => Ok(socket.local_addr()?),
            UdpTransport::Socks5(association) => association.local_addr(),
        }
    }

    /// first_hop is where datagrams physically go: the server or the relay
    pub fn first_hop(&self, server: SocketAddr) -> SocketAddr {
        match self {
            UdpTransport::Direct(_) => server,
            UdpTransport::Socks5(association) => association.relay(),
        }
    }

    /// close releases the association; plain sockets just drop
    pub async fn close(self) -> Result<()> {
        match self {
            UdpTransport::Direct(_) => Ok(()),
            UdpTransport::Socks5(association) => association.close().await,
        }
    }
}

/// route_local_ip asks the OS which local address it would use toward `peer`.
/// Nothing is sent: connecting a UDP socket only selects a route
pub async fn route_local_ip(peer: SocketAddr) -> Option<IpAddr> {
    let probe = UdpSocket::bind(crate::transport::wildcard_for(peer)).await.ok()?;
    probe.connect(peer).await.ok()?;
    probe.local_addr().ok().map(|addr| addr.ip())
}
