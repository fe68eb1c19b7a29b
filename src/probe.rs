use crate::config::{Config, DEFAULT_PROXY_PORT};
use crate::credential::{self, PasswordSource};
use crate::resolver::{TargetSpec, resolve};
use crate::session::Session;
use crate::stun::{
    ClassicStunResult, StunClient3489, StunClient5389Tcp, StunClient5389Udp, StunResult5389,
};
use crate::transport::{ProxyEndpoint, TransportDescriptor};
use anyhow::Result;
use std::fmt;
use tracing::{info, warn};

/// NatReport is the terminal state of whichever client ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatReport {
    Classic(ClassicStunResult),
    Behavior(StunResult5389),
}

impl fmt::Display for NatReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatReport::Classic(state) => state.fmt(f),
            NatReport::Behavior(state) => state.fmt(f),
        }
    }
}

/// compose_run resolves the server and proxy, negotiates proxy credentials
/// and composes the transport. `prompt` is asked for a password at most once
pub async fn compose_run<S: PasswordSource>(
    config: &Config,
    prompt: &mut S,
) -> Result<TransportDescriptor> {
    let server = TargetSpec::parse(&config.server, Some(config.port))?;
    let remote = resolve(&server, config.prefer_ipv6).await?;
    info!("server {} is {}", server, remote);

    let proxy = match &config.proxy {
        Some(raw) => {
            let spec = TargetSpec::parse(raw, Some(DEFAULT_PROXY_PORT))?;
            let addr = resolve(&spec, config.prefer_ipv6).await?;
            info!("proxy {} is {}", spec, addr);

            let credential = credential::negotiate(config.proxy_user.as_deref(), prompt)?;
            Some(ProxyEndpoint { addr, credential })
        }
        None => {
            if config.proxy_user.is_some() {
                warn!("--proxy-user has no effect without --proxy");
            }
            None
        }
    };

    let descriptor =
        TransportDescriptor::compose(&server.host, remote, proxy, config.tcp, config.tls);
    info!(
        "transport {} from {} to {}",
        descriptor.kind(),
        descriptor.local(),
        descriptor.remote()
    );
    Ok(descriptor)
}

/// run performs one complete probe and returns the classification
pub async fn run<S: PasswordSource>(config: &Config, prompt: &mut S) -> Result<NatReport> {
    let descriptor = compose_run(config, prompt).await?;

    if config.tcp {
        if config.rfc3489 {
            warn!("--3489 has no effect with --tcp");
        }
        let state = Session::new(StunClient5389Tcp::new(descriptor)?).run().await?;
        return Ok(NatReport::Behavior(state));
    }

    if config.rfc3489 {
        let state = Session::new(StunClient3489::new(descriptor)).run().await?;
        return Ok(NatReport::Classic(state));
    }

    let state = Session::new(StunClient5389Udp::new(descriptor)).run().await?;
    Ok(NatReport::Behavior(state))
}
