//! Transport composition
//!
//! One decision function, [`TransportKind::select`], maps the run flags to
//! exactly one of six transports. [`TransportDescriptor::compose`] binds the
//! chosen kind to its endpoints: the local side is always a wildcard address
//! with port 0 in the family of the first network hop (the proxy when one is
//! configured, otherwise the server).

pub mod socks5;
pub mod tcp;
pub mod tls;
pub mod udp;

use crate::credential::ProxyCredential;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// TransportKind is the concrete transport a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    UdpDirect,
    TcpDirect,
    TcpTls,
    UdpSocks5,
    TcpSocks5,
    TcpTlsOverSocks5,
}

impl TransportKind {
    /// select is the transport decision matrix. TLS only applies to TCP,
    /// so `use_tls` is ignored in UDP mode
    pub fn select(use_tcp: bool, use_tls: bool, proxy_present: bool) -> Self {
        match (use_tcp, use_tls, proxy_present) {
            (false, _, false) => TransportKind::UdpDirect,
            (false, _, true) => TransportKind::UdpSocks5,
            (true, false, false) => TransportKind::TcpDirect,
            (true, false, true) => TransportKind::TcpSocks5,
            (true, true, false) => TransportKind::TcpTls,
            (true, true, true) => TransportKind::TcpTlsOverSocks5,
        }
    }

    pub fn is_tcp(self) -> bool {
        !matches!(self, TransportKind::UdpDirect | TransportKind::UdpSocks5)
    }

    pub fn uses_tls(self) -> bool {
        matches!(self, TransportKind::TcpTls | TransportKind::TcpTlsOverSocks5)
    }

    pub fn uses_socks5(self) -> bool {
        matches!(
            self,
            TransportKind::UdpSocks5 | TransportKind::TcpSocks5 | TransportKind::TcpTlsOverSocks5
        )
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::UdpDirect => "UDP-direct",
            TransportKind::TcpDirect => "TCP-direct",
            TransportKind::TcpTls => "TCP-TLS",
            TransportKind::UdpSocks5 => "UDP-SOCKS5",
            TransportKind::TcpSocks5 => "TCP-SOCKS5",
            TransportKind::TcpTlsOverSocks5 => "TCP-TLS-over-SOCKS5",
        };
        f.write_str(name)
    }
}

/// ProxyEndpoint is a resolved SOCKS5 proxy and its optional credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub addr: SocketAddr,
    pub credential: Option<ProxyCredential>,
}

/// TransportDescriptor is a transport kind bound to concrete endpoints.
/// The proxy is present exactly when the kind tunnels through SOCKS5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDescriptor {
    kind: TransportKind,
    server_name: String,
    remote: SocketAddr,
    local: SocketAddr,
    proxy: Option<ProxyEndpoint>,
}

impl TransportDescriptor {
    /// compose selects the transport and derives the local wildcard endpoint
    /// from the first hop. `server_name` is the host the user typed, used
    /// for TLS certificate validation
    pub fn compose(
        server_name: &str,
        remote: SocketAddr,
        proxy: Option<ProxyEndpoint>,
        use_tcp: bool,
        use_tls: bool,
    ) -> Self {
        let kind = TransportKind::select(use_tcp, use_tls, proxy.is_some());
        let first_hop = proxy.as_ref().map_or(remote, |p| p.addr);

        Self {
            kind,
            server_name: server_name.to_string(),
            remote,
            local: wildcard_for(first_hop),
            proxy,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn local(&self) -> SocketAddr {
        self.local
    }

    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }
}

/// wildcard_for returns `0.0.0.0:0` or `[::]:0` matching `addr`'s family
pub fn wildcard_for(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}
