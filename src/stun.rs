//! STUN clients that classify the NAT in front of this host
//!
//! - [`classic`]: RFC 3489 NAT type discovery over UDP
//! - [`udp`]: RFC 5389/5780 mapping and filtering behavior discovery over UDP
//! - [`tcp`]: RFC 5389 mapping behavior discovery over TCP, TLS and SOCKS5

pub mod behavior;
pub mod classic;
pub mod message;
pub mod tcp;
pub mod udp;

use crate::transport::UdpTransport;
use crate::transport::udp::route_local_ip;
use anyhow::Result;
use message::{BINDING_ERROR_RESPONSE, BINDING_RESPONSE, StunMessage};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub use behavior::{BindingTestResult, FilteringBehavior, MappingBehavior, StunResult5389};
pub use classic::{ClassicStunResult, NatType, StunClient3489};
pub use tcp::StunClient5389Tcp;
pub use udp::StunClient5389Udp;

/// How long a single request waits for its response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

// Large enough for any STUN response
const RECV_BUF: usize = 2048;

/// udp_request sends `request` to `send_to` and waits for the matching
/// success response originating from `expect_from`. None means no response
pub(crate) async fn udp_request(
    transport: &UdpTransport,
    request: &StunMessage,
    send_to: SocketAddr,
    expect_from: SocketAddr,
    wait: Duration,
) -> Result<Option<StunMessage>> {
    transport.send_to(&request.encode(), send_to).await?;

    let deadline = Instant::now() + wait;
    let mut buf = vec![0u8; RECV_BUF];

    loop {
        let received = tokio::time::timeout_at(deadline, transport.recv_from(&mut buf)).await;
        let (n, from) = match received {
            Ok(result) => result?,
            Err(_) => {
                debug!("no response from {expect_from} within {wait:?}");
                return Ok(None);
            }
        };

        let response = match StunMessage::decode(&buf[..n]) {
            Ok(response) => response,
            Err(e) => {
                debug!("ignoring datagram from {from}: {e}");
                continue;
            }
        };

        if response.transaction_id != request.transaction_id {
            debug!("ignoring stale response from {from}");
            continue;
        }

        if from != expect_from {
            debug!("response from {from}, expected {expect_from}");
            continue;
        }

        return Ok(match response.message_type {
            BINDING_RESPONSE => {
                debug!("response from {from}, origin {:?}", response.response_origin());
                Some(response)
            }
            BINDING_ERROR_RESPONSE => {
                debug!("binding error response from {from}");
                None
            }
            other => {
                debug!("unexpected message type {other:#06x} from {from}");
                None
            }
        });
    }
}

/// local_endpoint is the address the server should see if nothing
/// translates: the routed local IP toward the first hop and the bound port
pub(crate) async fn local_endpoint(
    transport: &UdpTransport,
    server: SocketAddr,
) -> Result<SocketAddr> {
    let bound = transport.local_addr()?;
    let ip = route_local_ip(transport.first_hop(server))
        .await
        .unwrap_or(bound.ip());
    Ok(SocketAddr::new(ip, bound.port()))
}

/// Endpoint renders an optional endpoint as `ip:port` or `None`
pub(crate) struct Endpoint(pub Option<SocketAddr>);

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{addr}"),
            None => f.write_str("None"),
        }
    }
}
