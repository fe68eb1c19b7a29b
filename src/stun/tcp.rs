//! RFC 5389 mapping behavior discovery over TCP. Every test opens its own
//! connection; filtering cannot be observed and is reported as not applicable

use crate::error::Error;
use crate::session::NatClient;
use crate::stun::DEFAULT_TIMEOUT;
use crate::stun::behavior::{
    BindingProbe, FilteringBehavior, StunResult5389, binding_result, mapping_behavior_test,
};
use crate::stun::message::{HEADER_LEN, StunMessage};
use crate::transport::tcp::TcpConnection;
use crate::transport::{TcpTransport, TransportDescriptor};
use anyhow::{Result, bail};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

pub struct StunClient5389Tcp {
    descriptor: TransportDescriptor,
    transport: TcpTransport,
    local: SocketAddr,
    timeout: Duration,
    state: StunResult5389,
}

impl StunClient5389Tcp {
    pub fn new(descriptor: TransportDescriptor) -> Result<Self> {
        let transport = TcpTransport::from_descriptor(&descriptor)?;
        Ok(Self {
            local: descriptor.local(),
            descriptor,
            transport,
            timeout: DEFAULT_TIMEOUT,
            state: StunResult5389::default(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// open connects to `dest`, reusing the previous local port for direct
    /// connections so the NAT sees the same internal endpoint
    async fn open(&mut self, dest: SocketAddr) -> Result<TcpConnection> {
        match self.transport.connect(self.local, dest).await {
            Ok(connection) => Ok(connection),
            Err(e) if self.local.port() != 0 && is_bind_conflict(&e) => {
                debug!("local port {} unavailable, using an ephemeral port", self.local.port());
                self.local.set_port(0);
                self.transport.connect(self.local, dest).await
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange(&mut self, dest: SocketAddr) -> Result<(StunMessage, SocketAddr)> {
        let TcpConnection { mut stream, local } = self.open(dest).await?;
        if !self.transport.is_tunneled() {
            self.local = local;
        }

        let request = StunMessage::binding_request();
        stream.write_all(&request.encode()).await?;

        let mut frame = vec![0u8; HEADER_LEN];
        stream.read_exact(&mut frame).await?;
        let body = StunMessage::body_length(&frame)?;
        frame.resize(HEADER_LEN + body, 0);
        stream.read_exact(&mut frame[HEADER_LEN..]).await?;

        let response = StunMessage::decode(&frame)?;
        if response.transaction_id != request.transaction_id {
            bail!(Error::Stun("transaction id mismatch"));
        }

        // best effort, the server may already have closed its side
        let _ = stream.shutdown().await;
        Ok((response, local))
    }
}

fn is_bind_conflict(e: &anyhow::Error) -> bool {
    e.downcast_ref::<io::Error>().is_some_and(|e| {
        matches!(
            e.kind(),
            io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable
        )
    })
}

impl BindingProbe for StunClient5389Tcp {
    /// binding_test connects, sends one request and reads one response.
    /// Unreachable servers and timeouts are a failed test; proxy protocol
    /// errors abort the query
    async fn binding_test(&mut self, dest: SocketAddr) -> Result<StunResult5389> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.exchange(dest)).await {
            Ok(Ok((response, local))) => {
                let reported = if self.transport.is_tunneled() {
                    None
                } else {
                    Some(local)
                };
                Ok(binding_result(Some(&response), reported))
            }
            Ok(Err(e)) if matches!(e.downcast_ref::<Error>(), Some(Error::Socks5(_))) => Err(e),
            Ok(Err(e)) => {
                warn!("binding test to {dest} failed: {e:#}");
                Ok(binding_result(None, None))
            }
            Err(_) => {
                warn!("binding test to {dest} timed out after {timeout:?}");
                Ok(binding_result(None, None))
            }
        }
    }
}

impl NatClient for StunClient5389Tcp {
    type State = StunResult5389;

    async fn connect_proxy(&mut self) -> Result<()> {
        Ok(())
    }

    async fn query(&mut self) -> Result<()> {
        let server = self.descriptor.remote();
        let mut state = mapping_behavior_test(self, server).await?;
        state.filtering_behavior = FilteringBehavior::NotApplicable;
        info!("mapping behavior over {}: {}", self.descriptor.kind(), state.mapping_behavior);
        self.state = state;
        Ok(())
    }

    async fn close_proxy(&mut self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> &StunResult5389 {
        &self.state
    }
}
