//! Endpoint parsing and dual-stack resolution
//!
//! A target is written `host`, `host:port`, `[v6]` or `[v6]:port`. Resolution
//! keeps the first IPv4 and the first IPv6 address the resolver returns and
//! picks one of them by family preference.

use crate::error::Error;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use tracing::debug;

/// TargetSpec is an unresolved host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
}

impl TargetSpec {
    /// parse splits `raw` into host and port, falling back to `default_port`
    /// when there is no inline port
    pub fn parse(raw: &str, default_port: Option<u16>) -> Result<Self, Error> {
        let malformed = || Error::MalformedTarget(raw.to_string());

        // Bare IPv6 literal: every colon belongs to the address
        if raw.parse::<Ipv6Addr>().is_ok() {
            let port = default_port.ok_or_else(malformed)?;
            return Ok(Self::new(raw, port));
        }

        // Bracketed IPv6 literal with optional port
        if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(malformed)?;
            let port = match tail {
                "" => default_port.ok_or_else(malformed)?,
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(malformed)?;
                    parse_port(port).ok_or_else(malformed)?
                }
            };
            return Ok(Self::new(host, port));
        }

        match raw.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
                let port = parse_port(port).ok_or_else(malformed)?;
                Ok(Self::new(host, port))
            }
            _ => {
                let port = default_port.ok_or_else(malformed)?;
                Ok(Self::new(raw, port))
            }
        }
    }

    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// An empty port ("host:") is malformed, not defaulted
fn parse_port(digits: &str) -> Option<u16> {
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Candidates holds the first address of each family seen during resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Candidates {
    pub v4: Option<IpAddr>,
    pub v6: Option<IpAddr>,
}

impl Candidates {
    /// collect keeps the first IPv4 and first IPv6 address, discarding later
    /// addresses of an already seen family
    pub fn collect(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut candidates = Candidates::default();
        for addr in addrs {
            match addr {
                IpAddr::V4(_) => {
                    candidates.v4.get_or_insert(addr);
                }
                IpAddr::V6(_) => {
                    candidates.v6.get_or_insert(addr);
                }
            }
        }
        candidates
    }

    /// select applies the family preference, falling back to the other family
    pub fn select(&self, prefer_ipv6: bool) -> Option<IpAddr> {
        if prefer_ipv6 {
            self.v6.or(self.v4)
        } else {
            self.v4.or(self.v6)
        }
    }
}

/// resolve looks up `spec.host` and returns exactly one endpoint
pub async fn resolve(spec: &TargetSpec, prefer_ipv6: bool) -> Result<SocketAddr, Error> {
    let failure = || Error::ResolutionFailure {
        host: spec.host.clone(),
    };

    let addrs = match tokio::net::lookup_host((spec.host.as_str(), spec.port)).await {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("lookup of {} failed: {}", spec.host, e);
            return Err(failure());
        }
    };

    let candidates = Candidates::collect(addrs.map(|addr| addr.ip()));
    debug!(
        "resolved {}: v4={:?} v6={:?}",
        spec.host, candidates.v4, candidates.v6
    );

    let ip = candidates.select(prefer_ipv6).ok_or_else(failure)?;
    Ok(SocketAddr::new(ip, spec.port))
}
