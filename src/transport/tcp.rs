use crate::transport::tls::TlsClient;
use crate::transport::{ProxyEndpoint, TransportDescriptor, TransportKind, socks5};
use anyhow::{Result, bail};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

/// AsyncStream is any bidirectional byte stream a STUN-over-TCP client can use
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// TcpConnection is an established stream and the local address of the
/// first-hop TCP socket underneath it
pub struct TcpConnection {
    pub stream: Box<dyn AsyncStream>,
    pub local: SocketAddr,
}

/// TcpTransport opens fresh connections to the server according to the
/// composed transport kind
pub enum TcpTransport {
    Direct,
    Tls(TlsClient),
    Socks5(ProxyEndpoint),
    TlsOverSocks5(ProxyEndpoint, TlsClient),
}

impl TcpTransport {
    /// from_descriptor builds the TCP transport for a TCP kind
    pub fn from_descriptor(descriptor: &TransportDescriptor) -> Result<Self> {
        let transport = match (descriptor.kind(), descriptor.proxy().cloned()) {
            (TransportKind::TcpDirect, None) => TcpTransport::Direct,
            (TransportKind::TcpTls, None) => {
                TcpTransport::Tls(TlsClient::new(descriptor.server_name())?)
            }
            (TransportKind::TcpSocks5, Some(proxy)) => TcpTransport::Socks5(proxy),
            (TransportKind::TcpTlsOverSocks5, Some(proxy)) => {
                TcpTransport::TlsOverSocks5(proxy, TlsClient::new(descriptor.server_name())?)
            }
            (kind, _) => bail!("[ERR] {kind} is not a TCP transport"),
        };

        Ok(transport)
    }

    /// is_tunneled reports whether the first hop is a proxy rather than the server
    pub fn is_tunneled(&self) -> bool {
        matches!(self, TcpTransport::Socks5(_) | TcpTransport::TlsOverSocks5(..))
    }

    /// connect opens a new stream to `remote`, binding the first hop to `local`
    pub async fn connect(&self, local: SocketAddr, remote: SocketAddr) -> Result<TcpConnection> {
        let connection = match self {
            TcpTransport::Direct => {
                let stream = connect_from(local, remote).await?;
                let local = stream.local_addr()?;
                TcpConnection {
                    stream: Box::new(stream),
                    local,
                }
            }
            TcpTransport::Tls(tls) => {
                let stream = connect_from(local, remote).await?;
                let local = stream.local_addr()?;
                TcpConnection {
                    stream: Box::new(tls.wrap(stream).await?),
                    local,
                }
            }
            TcpTransport::Socks5(proxy) => {
                let stream = socks5::connect(local, proxy, remote).await?;
                let local = stream.local_addr()?;
                TcpConnection {
                    stream: Box::new(stream),
                    local,
                }
            }
            TcpTransport::TlsOverSocks5(proxy, tls) => {
                // TLS runs end to end with the server, the tunnel only carries bytes
                let stream = socks5::connect(local, proxy, remote).await?;
                let local = stream.local_addr()?;
                TcpConnection {
                    stream: Box::new(tls.wrap(stream).await?),
                    local,
                }
            }
        };

        debug!("tcp connection to {} from {}", remote, connection.local);
        Ok(connection)
    }
}

/// connect_from opens a TCP connection from an explicit local address
pub async fn connect_from(local: SocketAddr, remote: SocketAddr) -> io::Result<TcpStream> {
    let socket = match local {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };

    // Allows rebinding a local port that still has connections in TIME_WAIT
    socket.set_reuseaddr(true)?;
    socket.bind(local)?;
    socket.connect(remote).await
}
