//! SOCKS5 client side
//!
//! - CONNECT for TCP transports
//! - UDP ASSOCIATE for UDP transports
//! - No Authentication and Username/Password Authentication
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//! - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)

pub mod address;
pub mod auth;
pub mod client;
pub mod protocol;
pub mod udp;

pub use client::connect;
pub use udp::UdpAssociation;
