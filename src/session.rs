use anyhow::{Result, bail};
use std::fmt;
use tracing::{debug, warn};

/// NatClient is the contract every STUN client variant fulfils. Its state
/// is readable at any time and renders as the report printed to the user
pub trait NatClient {
    type State: fmt::Display + Clone;

    /// connect_proxy prepares the path to the server. TCP clients connect
    /// per test, so for them this does nothing
    fn connect_proxy(&mut self) -> impl Future<Output = Result<()>>;

    /// query runs the discovery tests and fills in the state
    fn query(&mut self) -> impl Future<Output = Result<()>>;

    /// close_proxy releases whatever connect_proxy set up
    fn close_proxy(&mut self) -> impl Future<Output = Result<()>>;

    fn state(&self) -> &Self::State;
}

/// Lifecycle of a single probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    ProxyConnected,
    Queried,
    Closed,
}

/// Session drives one client through
/// Created -> ProxyConnected -> Queried -> Closed, refusing any other order
pub struct Session<C> {
    client: C,
    lifecycle: Lifecycle,
}

impl<C: NatClient> Session<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            lifecycle: Lifecycle::Created,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn ensure_step(&self, step: &str, allowed: &[Lifecycle]) -> Result<()> {
        if !allowed.contains(&self.lifecycle) {
            bail!("[ERR] {step} not allowed in state {:?}", self.lifecycle);
        }
        Ok(())
    }

    pub async fn connect_proxy(&mut self) -> Result<()> {
        self.ensure_step("connect_proxy", &[Lifecycle::Created])?;
        self.client.connect_proxy().await?;
        self.lifecycle = Lifecycle::ProxyConnected;
        debug!("session: proxy connected");
        Ok(())
    }

    pub async fn query(&mut self) -> Result<()> {
        self.ensure_step("query", &[Lifecycle::ProxyConnected])?;
        self.client.query().await?;
        self.lifecycle = Lifecycle::Queried;
        debug!("session: queried");
        Ok(())
    }

    /// close releases the proxy. The session is Closed afterwards even if
    /// releasing failed
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_step("close", &[Lifecycle::ProxyConnected, Lifecycle::Queried])?;
        let closed = self.client.close_proxy().await;
        self.lifecycle = Lifecycle::Closed;
        debug!("session: closed");
        closed
    }

    /// run performs the full lifecycle and returns the final client state.
    /// A failed query still closes the proxy before its error is returned
    pub async fn run(&mut self) -> Result<C::State> {
        self.connect_proxy().await?;

        if let Err(e) = self.query().await {
            if let Err(close_err) = self.close().await {
                warn!("closing after failed query: {close_err:#}");
            }
            return Err(e);
        }

        self.close().await?;
        Ok(self.client.state().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
        fail_query: bool,
        answer: String,
    }

    impl NatClient for Recorder {
        type State = String;

        async fn connect_proxy(&mut self) -> Result<()> {
            self.calls.push("connect_proxy");
            Ok(())
        }

        async fn query(&mut self) -> Result<()> {
            self.calls.push("query");
            if self.fail_query {
                return Err(anyhow!("server went away"));
            }
            self.answer = "NAT type: FullCone".into();
            Ok(())
        }

        async fn close_proxy(&mut self) -> Result<()> {
            self.calls.push("close_proxy");
            Ok(())
        }

        fn state(&self) -> &String {
            &self.answer
        }
    }

    #[tokio::test]
    async fn run_follows_the_lifecycle() {
        let state = Session::new(Recorder::default()).run().await.unwrap();
        assert_eq!(state, "NAT type: FullCone");
    }

    #[tokio::test]
    async fn steps_advance_in_order() {
        let mut session = Session::new(Recorder::default());
        assert_eq!(session.lifecycle(), Lifecycle::Created);

        session.connect_proxy().await.unwrap();
        assert_eq!(session.lifecycle(), Lifecycle::ProxyConnected);
        session.query().await.unwrap();
        assert_eq!(session.lifecycle(), Lifecycle::Queried);
        session.close().await.unwrap();
        assert_eq!(session.lifecycle(), Lifecycle::Closed);

        assert_eq!(session.client().calls, ["connect_proxy", "query", "close_proxy"]);
    }

    #[tokio::test]
    async fn out_of_order_steps_are_refused() {
        let mut session = Session::new(Recorder::default());
        assert!(session.query().await.is_err());
        assert!(session.close().await.is_err());

        session.connect_proxy().await.unwrap();
        assert!(session.connect_proxy().await.is_err());

        session.close().await.unwrap();
        assert!(session.query().await.is_err());
        assert!(session.close().await.is_err());

        // refused steps never reach the client
        assert_eq!(session.client().calls, ["connect_proxy", "close_proxy"]);
    }

    #[tokio::test]
    async fn failed_query_still_closes() {
        let client = Recorder {
            fail_query: true,
            ..Default::default()
        };
        let mut session = Session::new(client);
        session.connect_proxy().await.unwrap();
        assert!(session.query().await.is_err());
        assert_eq!(session.lifecycle(), Lifecycle::ProxyConnected);

        let client = Recorder {
            fail_query: true,
            ..Default::default()
        };
        let mut session = Session::new(client);
        let err = session.run().await.unwrap_err();
        assert_eq!(err.to_string(), "server went away");
        assert_eq!(session.lifecycle(), Lifecycle::Closed);
        assert_eq!(session.client().calls, ["connect_proxy", "query", "close_proxy"]);
    }
}
