//! RFC 5389/5780 behavior discovery over UDP

use crate::session::NatClient;
use crate::stun::behavior::{
    BindingProbe, BindingTestResult, FilteringBehavior, StunResult5389, binding_result,
    mapping_behavior_test, usable_other,
};
use crate::stun::message::StunMessage;
use crate::stun::{DEFAULT_TIMEOUT, local_endpoint, udp_request};
use crate::transport::{TransportDescriptor, UdpTransport};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

pub struct StunClient5389Udp {
    descriptor: TransportDescriptor,
    transport: Option<UdpTransport>,
    local: Option<SocketAddr>,
    timeout: Duration,
    state: StunResult5389,
}

impl StunClient5389Udp {
    pub fn new(descriptor: TransportDescriptor) -> Self {
        Self {
            descriptor,
            transport: None,
            local: None,
            timeout: DEFAULT_TIMEOUT,
            state: StunResult5389::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn transport(&self) -> Result<&UdpTransport> {
        self.transport
            .as_ref()
            .context("[ERR] query before connect_proxy")
    }

    async fn binding(&self, dest: SocketAddr) -> Result<StunResult5389> {
        let request = StunMessage::binding_request();
        let response = udp_request(self.transport()?, &request, dest, dest, self.timeout).await?;
        Ok(binding_result(response.as_ref(), self.local))
    }

    /// filtering_behavior_test runs RFC 5780 section 4.4 tests I to III
    async fn filtering_behavior_test(&self) -> Result<StunResult5389> {
        let server = self.descriptor.remote();

        // test I
        let mut state = self.binding(server).await?;
        if state.binding_test_result != BindingTestResult::Success {
            return Ok(state);
        }

        let Some(other) = usable_other(&state, server) else {
            state.filtering_behavior = FilteringBehavior::UnsupportedServer;
            return Ok(state);
        };

        // test II: reply from the alternate IP and port
        let test2 = StunMessage::binding_request_changed(true, true);
        if udp_request(self.transport()?, &test2, server, other, self.timeout)
            .await?
            .is_some()
        {
            state.filtering_behavior = FilteringBehavior::EndpointIndependent;
            return Ok(state);
        }

        // test III: reply from the alternate port only
        let test3 = StunMessage::binding_request_changed(false, true);
        let expect = SocketAddr::new(server.ip(), other.port());
        let response = udp_request(self.transport()?, &test3, server, expect, self.timeout).await?;
        state.filtering_behavior = match response {
            Some(_) => FilteringBehavior::AddressDependent,
            None => FilteringBehavior::AddressAndPortDependent,
        };

        Ok(state)
    }
}

impl BindingProbe for StunClient5389Udp {
    async fn binding_test(&mut self, dest: SocketAddr) -> Result<StunResult5389> {
        self.binding(dest).await
    }
}

impl NatClient for StunClient5389Udp {
    type State = StunResult5389;

    async fn connect_proxy(&mut self) -> Result<()> {
        let transport = UdpTransport::open(&self.descriptor).await?;
        self.local = Some(local_endpoint(&transport, self.descriptor.remote()).await?);
        self.state.local_endpoint = self.local;
        self.transport = Some(transport);
        Ok(())
    }

    /// query runs the filtering tests first. Mapping is only probed when
    /// the server proved it can answer from its alternate address
    async fn query(&mut self) -> Result<()> {
        let filtering = self.filtering_behavior_test().await?;
        info!("filtering behavior: {}", filtering.filtering_behavior);

        if filtering.binding_test_result != BindingTestResult::Success
            || filtering.filtering_behavior == FilteringBehavior::UnsupportedServer
        {
            self.state = filtering;
            return Ok(());
        }

        let server = self.descriptor.remote();
        let mapping = mapping_behavior_test(self, server).await?;
        self.state = StunResult5389 {
            filtering_behavior: filtering.filtering_behavior,
            ..mapping
        };
        Ok(())
    }

    async fn close_proxy(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }

    fn state(&self) -> &StunResult5389 {
        &self.state
    }
}
