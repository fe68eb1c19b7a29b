//! RFC 3489 classic NAT type discovery

use crate::session::NatClient;
use crate::stun::message::StunMessage;
use crate::stun::{DEFAULT_TIMEOUT, Endpoint, local_endpoint, udp_request};
use crate::transport::{TransportDescriptor, UdpTransport};
use anyhow::{Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NatType {
    #[default]
    Unknown,
    UnsupportedServer,
    UdpBlocked,
    OpenInternet,
    SymmetricUdpFirewall,
    FullCone,
    RestrictedCone,
    PortRestrictedCone,
    Symmetric,
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// ClassicStunResult is the state of an RFC 3489 client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassicStunResult {
    pub nat_type: NatType,
    pub public_endpoint: Option<SocketAddr>,
    pub local_endpoint: Option<SocketAddr>,
}

impl fmt::Display for ClassicStunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NAT type: {}", self.nat_type)?;
        writeln!(f, "Public endpoint: {}", Endpoint(self.public_endpoint))?;
        write!(f, "Local endpoint: {}", Endpoint(self.local_endpoint))
    }
}

pub struct StunClient3489 {
    descriptor: TransportDescriptor,
    transport: Option<UdpTransport>,
    timeout: Duration,
    state: ClassicStunResult,
}

impl StunClient3489 {
    pub fn new(descriptor: TransportDescriptor) -> Self {
        Self {
            descriptor,
            transport: None,
            timeout: DEFAULT_TIMEOUT,
            state: ClassicStunResult::default(),
        }
    }

    /// with_timeout sets how long each test waits for its response
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request(
        &self,
        request: &StunMessage,
        send_to: SocketAddr,
        expect_from: SocketAddr,
    ) -> Result<Option<StunMessage>> {
        let transport = self
            .transport
            .as_ref()
            .context("[ERR] query before connect_proxy")?;
        udp_request(transport, request, send_to, expect_from, self.timeout).await
    }

    /// classify walks the RFC 3489 decision tree
    async fn classify(&self) -> Result<ClassicStunResult> {
        let server = self.descriptor.remote();
        let mut result = ClassicStunResult {
            local_endpoint: self.state.local_endpoint,
            ..Default::default()
        };

        // test I
        let Some(response) = self
            .request(&StunMessage::binding_request(), server, server)
            .await?
        else {
            result.nat_type = NatType::UdpBlocked;
            return Ok(result);
        };

        let mapped1 = public_address(&response);
        let changed = response
            .changed_address()
            .or_else(|| response.other_address());
        result.public_endpoint = mapped1;

        let (Some(mapped1), Some(changed)) = (mapped1, changed) else {
            result.nat_type = NatType::UnsupportedServer;
            return Ok(result);
        };
        if changed.ip() == server.ip() || changed.port() == server.port() {
            debug!("changed address {changed} is not a distinct endpoint");
            result.nat_type = NatType::UnsupportedServer;
            return Ok(result);
        }

        // test II: reply from the other IP and port
        let test2 = StunMessage::binding_request_changed(true, true);
        let response2 = self.request(&test2, server, changed).await?;

        if Some(mapped1) == result.local_endpoint {
            result.nat_type = match response2 {
                Some(_) => NatType::OpenInternet,
                None => NatType::SymmetricUdpFirewall,
            };
            return Ok(result);
        }

        if response2.is_some() {
            result.nat_type = NatType::FullCone;
            return Ok(result);
        }

        // test I against the changed address
        let Some(response1b) = self
            .request(&StunMessage::binding_request(), changed, changed)
            .await?
        else {
            result.nat_type = NatType::Unknown;
            return Ok(result);
        };

        if public_address(&response1b) != Some(mapped1) {
            result.nat_type = NatType::Symmetric;
            return Ok(result);
        }

        // test III: reply from the other port only
        let test3 = StunMessage::binding_request_changed(false, true);
        let expect = SocketAddr::new(server.ip(), changed.port());
        result.nat_type = match self.request(&test3, server, expect).await? {
            Some(_) => NatType::RestrictedCone,
            None => NatType::PortRestrictedCone,
        };

        Ok(result)
    }
}

// RFC 3489 servers answer with MAPPED-ADDRESS; newer ones may only send the XOR form
fn public_address(response: &StunMessage) -> Option<SocketAddr> {
    response
        .mapped_address()
        .or_else(|| response.xor_mapped_address())
}

impl NatClient for StunClient3489 {
    type State = ClassicStunResult;

    async fn connect_proxy(&mut self) -> Result<()> {
        let transport = UdpTransport::open(&self.descriptor).await?;
        let local = local_endpoint(&transport, self.descriptor.remote()).await?;
        self.state.local_endpoint = Some(local);
        self.transport = Some(transport);
        Ok(())
    }

    async fn query(&mut self) -> Result<()> {
        self.state = self.classify().await?;
        info!("NAT type: {}", self.state.nat_type);
        Ok(())
    }

    async fn close_proxy(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }

    fn state(&self) -> &ClassicStunResult {
        &self.state
    }
}
