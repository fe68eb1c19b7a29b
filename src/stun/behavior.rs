//! RFC 5780 behavior discovery results and the mapping test sequence,
//! shared by the UDP and TCP clients

use crate::stun::Endpoint;
use crate::stun::message::StunMessage;
use anyhow::Result;
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindingTestResult {
    #[default]
    Unknown,
    Success,
    Fail,
    UnsupportedServer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MappingBehavior {
    #[default]
    Unknown,
    Direct,
    EndpointIndependent,
    AddressDependent,
    AddressAndPortDependent,
    Fail,
    UnsupportedServer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilteringBehavior {
    #[default]
    Unknown,
    EndpointIndependent,
    AddressDependent,
    AddressAndPortDependent,
    UnsupportedServer,
    /// Filtering cannot be probed over TCP
    NotApplicable,
}

macro_rules! display_as_debug {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        })*
    };
}

display_as_debug!(BindingTestResult, MappingBehavior, FilteringBehavior);

/// StunResult5389 is the state of an RFC 5389 client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StunResult5389 {
    pub binding_test_result: BindingTestResult,
    pub mapping_behavior: MappingBehavior,
    pub filtering_behavior: FilteringBehavior,
    pub public_endpoint: Option<SocketAddr>,
    pub local_endpoint: Option<SocketAddr>,
    pub other_endpoint: Option<SocketAddr>,
}

impl fmt::Display for StunResult5389 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Binding test: {}", self.binding_test_result)?;
        writeln!(f, "Mapping behavior: {}", self.mapping_behavior)?;
        writeln!(f, "Filtering behavior: {}", self.filtering_behavior)?;
        writeln!(f, "Public endpoint: {}", Endpoint(self.public_endpoint))?;
        writeln!(f, "Local endpoint: {}", Endpoint(self.local_endpoint))?;
        write!(f, "Other endpoint: {}", Endpoint(self.other_endpoint))
    }
}

/// binding_result interprets a binding response (or its absence).
/// XOR-MAPPED-ADDRESS is preferred, MAPPED-ADDRESS accepted from older
/// servers; OTHER-ADDRESS falls back to CHANGED-ADDRESS the same way
pub(crate) fn binding_result(
    response: Option<&StunMessage>,
    local: Option<SocketAddr>,
) -> StunResult5389 {
    let Some(response) = response else {
        return StunResult5389 {
            binding_test_result: BindingTestResult::Fail,
            local_endpoint: local,
            ..Default::default()
        };
    };

    let public = response
        .xor_mapped_address()
        .or_else(|| response.mapped_address());

    StunResult5389 {
        binding_test_result: if public.is_some() {
            BindingTestResult::Success
        } else {
            BindingTestResult::UnsupportedServer
        },
        public_endpoint: public,
        local_endpoint: local,
        other_endpoint: response
            .other_address()
            .or_else(|| response.changed_address()),
        ..Default::default()
    }
}

/// BindingProbe runs one binding test against `dest`
pub(crate) trait BindingProbe {
    async fn binding_test(&mut self, dest: SocketAddr) -> Result<StunResult5389>;
}

/// usable_other returns OTHER-ADDRESS when it differs from the server in both
/// IP and port, which the behavior tests require
pub(crate) fn usable_other(state: &StunResult5389, server: SocketAddr) -> Option<SocketAddr> {
    state
        .other_endpoint
        .filter(|other| other.ip() != server.ip() && other.port() != server.port())
}

/// mapping_behavior_test runs RFC 5780 section 4.3 tests I to III
pub(crate) async fn mapping_behavior_test<P: BindingProbe>(
    probe: &mut P,
    server: SocketAddr,
) -> Result<StunResult5389> {
    // test I
    let mut state = probe.binding_test(server).await?;
    if state.binding_test_result != BindingTestResult::Success {
        return Ok(state);
    }

    let Some(other) = usable_other(&state, server) else {
        state.mapping_behavior = MappingBehavior::UnsupportedServer;
        return Ok(state);
    };

    if state.local_endpoint == state.public_endpoint {
        state.mapping_behavior = MappingBehavior::Direct;
        return Ok(state);
    }

    // test II: alternate IP, primary port
    let result2 = probe
        .binding_test(SocketAddr::new(other.ip(), server.port()))
        .await?;
    debug!("mapping test II: {:?}", result2.public_endpoint);
    if result2.binding_test_result != BindingTestResult::Success {
        state.mapping_behavior = MappingBehavior::Fail;
        return Ok(state);
    }

    if result2.public_endpoint == state.public_endpoint {
        state.mapping_behavior = MappingBehavior::EndpointIndependent;
        return Ok(state);
    }

    // test III: alternate IP and port
    let result3 = probe.binding_test(other).await?;
    debug!("mapping test III: {:?}", result3.public_endpoint);
    if result3.binding_test_result != BindingTestResult::Success {
        state.mapping_behavior = MappingBehavior::Fail;
        return Ok(state);
    }

    state.mapping_behavior = if result3.public_endpoint == result2.public_endpoint {
        MappingBehavior::AddressDependent
    } else {
        MappingBehavior::AddressAndPortDependent
    };

    info!("mapping behavior: {}", state.mapping_behavior);
    Ok(state)
}
