//! STUN binding exchanges over TLS, direct and tunneled through SOCKS5

#![cfg(target_os = "linux")]

mod common;

use common::{spawn_socks5, spawn_tls_stun, test_tls};
use natprobe::stun::message::{HEADER_LEN, StunMessage};
use natprobe::transport::tls::TlsClient;
use natprobe::transport::{ProxyEndpoint, TcpTransport};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const WILDCARD: &str = "0.0.0.0:0";

// One binding request on a fresh connection; returns the reported address
// and the local address of the first hop
async fn binding(
    transport: &TcpTransport,
    server: SocketAddr,
) -> anyhow::Result<(SocketAddr, SocketAddr)> {
    let conn = transport.connect(WILDCARD.parse()?, server).await?;
    let mut stream = conn.stream;

    let request = StunMessage::binding_request();
    stream.write_all(&request.encode()).await?;
    stream.flush().await?;

    let mut frame = vec![0u8; HEADER_LEN];
    stream.read_exact(&mut frame).await?;
    frame.resize(HEADER_LEN + StunMessage::body_length(&frame)?, 0);
    stream.read_exact(&mut frame[HEADER_LEN..]).await?;

    let response = StunMessage::decode(&frame)?;
    assert_eq!(response.transaction_id, request.transaction_id);
    let mapped = response
        .xor_mapped_address()
        .ok_or_else(|| anyhow::anyhow!("no XOR-MAPPED-ADDRESS"))?;
    Ok((mapped, conn.local))
}

#[tokio::test]
async fn tls_direct_reports_the_client_address() {
    let tls = test_tls("stun.test");
    let server = spawn_tls_stun(tls.acceptor).await;

    let client = TlsClient::with_config(tls.client, "stun.test").unwrap();
    let (mapped, local) = binding(&TcpTransport::Tls(client), server).await.unwrap();
    assert_eq!(mapped, local);
}

#[tokio::test]
async fn tls_over_socks5_validates_the_server_name() {
    let tls = test_tls("stun.test");
    let server = spawn_tls_stun(tls.acceptor).await;
    let proxy = spawn_socks5(None).await;

    let endpoint = ProxyEndpoint {
        addr: proxy,
        credential: None,
    };
    let client = TlsClient::with_config(tls.client, "stun.test").unwrap();
    let transport = TcpTransport::TlsOverSocks5(endpoint, client);

    let (mapped, local) = binding(&transport, server).await.unwrap();
    // the server sees the proxy's outbound socket, not ours
    assert_eq!(mapped.ip(), proxy.ip());
    assert_ne!(mapped, local);
}

#[tokio::test]
async fn tls_over_socks5_refuses_the_proxy_name() {
    let tls = test_tls("stun.test");
    let server = spawn_tls_stun(tls.acceptor).await;
    let proxy = spawn_socks5(None).await;

    let endpoint = ProxyEndpoint {
        addr: proxy,
        credential: None,
    };
    let client = TlsClient::with_config(tls.client, &proxy.ip().to_string()).unwrap();
    let transport = TcpTransport::TlsOverSocks5(endpoint, client);

    let err = binding(&transport, server).await.unwrap_err();
    assert!(err.to_string().contains("TLS handshake failed"));
}
