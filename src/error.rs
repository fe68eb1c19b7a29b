use thiserror::Error;

/// Error is the typed failure taxonomy surfaced to the top-level handler.
/// Everything else travels as an `anyhow::Error` and is reported verbatim.
#[derive(Debug, Error)]
pub enum Error {
    /// `host` had no inline port and no default port was supplied,
    /// or the inline port was not a valid port number
    #[error("malformed target '{0}': missing or invalid port")]
    MalformedTarget(String),

    /// Name resolution produced neither an IPv4 nor an IPv6 address
    #[error("can't resolve address")]
    ResolutionFailure { host: String },

    /// No server given, neither positionally nor with --server
    #[error("no STUN server specified")]
    MissingServerArgument,

    /// The SOCKS5 proxy refused or violated the protocol
    #[error("[ERR] socks5: {0}")]
    Socks5(String),

    /// A STUN message could not be decoded
    #[error("[ERR] stun: {0}")]
    Stun(&'static str),
}

impl Error {
    /// is_usage reports whether the failure is a usage/resolution failure
    /// (the ones the binary reports without a backtrace of causes)
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::MalformedTarget(_)
                | Error::ResolutionFailure { .. }
                | Error::MissingServerArgument
        )
    }
}
