//! A NAT type tester
//!
//! ## Probing
//!
//! - Features:
//!     - RFC 3489 classic NAT type discovery over UDP
//!     - RFC 5389/5780 mapping and filtering behavior discovery over UDP
//!     - RFC 5389 mapping behavior discovery over TCP and TLS
//!     - SOCKS5 tunneling (CONNECT and UDP ASSOCIATE), with or without
//!       username/password authentication
//!     - IPv4/IPv6 preference for dual-stack hosts
//! - [STUN (RFC 5389)](https://datatracker.ietf.org/doc/html/rfc5389)
//! - [NAT Behavior Discovery (RFC 5780)](https://datatracker.ietf.org/doc/html/rfc5780)
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! # Example
//! ```no_run
//! use natprobe::{Config, TerminalPrompt, probe};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config {
//!         server: "stun.example.com".into(),
//!         port: 3478,
//!         rfc3489: false,
//!         prefer_ipv6: false,
//!         proxy: None,
//!         proxy_user: None,
//!         tcp: false,
//!         tls: false,
//!     };
//!     let report = probe::run(&config, &mut TerminalPrompt::new()).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod probe;
pub mod resolver;
pub mod session;
pub mod stun;
pub mod transport;

// Re-export main types at crate root for convenience
pub use config::{Args, Config};
pub use credential::{PasswordSource, ProxyCredential, TerminalPrompt};
pub use error::Error;
pub use probe::NatReport;
pub use session::{Lifecycle, NatClient, Session};
pub use transport::{TransportDescriptor, TransportKind};
