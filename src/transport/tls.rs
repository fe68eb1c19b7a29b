use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, crypto};
use tracing::debug;

/// TlsClient wraps byte streams in TLS, validating the server certificate
/// against `server_name` whatever the stream is physically connected to
pub struct TlsClient {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsClient {
    /// new builds a client trusting the webpki root set
    pub fn new(host: &str) -> Result<Self> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let provider = Arc::new(crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .context("[ERR] TLS protocol versions")?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self::with_config(Arc::new(config), host)
    }

    /// with_config uses a caller-supplied client config
    pub fn with_config(config: Arc<ClientConfig>, host: &str) -> Result<Self> {
        let server_name = ServerName::try_from(host.to_string())
            .with_context(|| format!("[ERR] invalid TLS server name '{host}'"))?;

        Ok(Self {
            connector: TlsConnector::from(config),
            server_name,
        })
    }

    /// wrap performs the TLS handshake over `stream`
    pub async fn wrap<S>(&self, stream: S) -> Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let tls = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await
            .context("[ERR] TLS handshake failed")?;

        debug!("TLS established with {:?}", self.server_name);
        Ok(tls)
    }
}
