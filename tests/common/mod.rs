//! Loopback peers for end-to-end sessions: a STUN server answering from two
//! IPs and two ports, TCP and TLS STUN servers and a SOCKS5 proxy

#![allow(dead_code)]

use natprobe::stun::message::{
    Attribute, CHANGED_ADDRESS, HEADER_LEN, MAPPED_ADDRESS, OTHER_ADDRESS, RESPONSE_ORIGIN,
    StunMessage,
};
use natprobe::transport::socks5::address::encode_address;
use natprobe::transport::socks5::udp::{unwrap_datagram, wrap_datagram};
use natprobe::{Config, PasswordSource};
use rcgen::{CertificateParams, KeyPair};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, copy_bidirectional};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig, crypto};

pub const IP1: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
pub const IP2: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));

/// Prompt counts password prompts and always types `typed`
#[derive(Default)]
pub struct Prompt {
    pub prompts: usize,
}

impl PasswordSource for Prompt {
    fn read_password(&mut self) -> io::Result<String> {
        self.prompts += 1;
        Ok("typed".into())
    }
}

pub fn config(server: SocketAddr) -> Config {
    Config {
        server: server.to_string(),
        port: 3478,
        rfc3489: false,
        prefer_ipv6: false,
        proxy: None,
        proxy_user: None,
        tcp: false,
        tls: false,
    }
}

/// UdpStun is a full-featured STUN server on IP1:P1 (primary) and IP2:P2 (other)
pub struct UdpStun {
    pub primary: SocketAddr,
    pub other: SocketAddr,
}

// Index in the grid: bit 1 selects IP2, bit 0 selects P2
fn grid_index(ip2: bool, port2: bool) -> usize {
    (usize::from(ip2) << 1) | usize::from(port2)
}

async fn bind_grid() -> [Arc<UdpSocket>; 4] {
    for _ in 0..16 {
        let a1p1 = UdpSocket::bind((IP1, 0)).await.unwrap();
        let a2p2 = UdpSocket::bind((IP2, 0)).await.unwrap();
        let p1 = a1p1.local_addr().unwrap().port();
        let p2 = a2p2.local_addr().unwrap().port();

        let (Ok(a1p2), Ok(a2p1)) = (
            UdpSocket::bind((IP1, p2)).await,
            UdpSocket::bind((IP2, p1)).await,
        ) else {
            continue;
        };

        return [a1p1, a1p2, a2p1, a2p2].map(Arc::new);
    }
    panic!("could not bind a STUN socket grid on loopback");
}

pub async fn spawn_udp_stun() -> UdpStun {
    let grid = Arc::new(bind_grid().await);
    let primary = grid[grid_index(false, false)].local_addr().unwrap();
    let other = grid[grid_index(true, true)].local_addr().unwrap();

    for own in 0..4 {
        let grid = grid.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                let Ok((n, from)) = grid[own].recv_from(&mut buf).await else {
                    return;
                };
                let Ok(request) = StunMessage::decode(&buf[..n]) else {
                    continue;
                };

                let (change_ip, change_port) = request.requested_change();
                let is_ip2 = own & 0b10 != 0;
                let is_port2 = own & 0b01 != 0;
                let responder = &grid[grid_index(is_ip2 ^ change_ip, is_port2 ^ change_port)];
                let origin = responder.local_addr().unwrap();

                let response = StunMessage::binding_response(
                    &request,
                    vec![
                        Attribute::address(MAPPED_ADDRESS, from),
                        Attribute::xor_address(from, &request.transaction_id),
                        Attribute::address(RESPONSE_ORIGIN, origin),
                        Attribute::address(OTHER_ADDRESS, other),
                        Attribute::address(CHANGED_ADDRESS, other),
                    ],
                );
                let _ = responder.send_to(&response.encode(), from).await;
            }
        });
    }

    UdpStun { primary, other }
}

/// spawn_tcp_stun answers every connection with its source address and no
/// alternate address
pub async fn spawn_tcp_stun() -> SocketAddr {
    let listener = TcpListener::bind((IP1, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut peer, from)) = listener.accept().await {
            tokio::spawn(async move { answer_binding(&mut peer, from).await });
        }
    });

    addr
}

/// spawn_tls_stun is spawn_tcp_stun behind a TLS handshake
pub async fn spawn_tls_stun(acceptor: TlsAcceptor) -> SocketAddr {
    let listener = TcpListener::bind((IP1, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((peer, from)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let mut tls = acceptor.accept(peer).await?;
                answer_binding(&mut tls, from).await
            });
        }
    });

    addr
}

async fn answer_binding<S>(stream: &mut S, from: SocketAddr) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = vec![0u8; HEADER_LEN];
    stream.read_exact(&mut frame).await?;
    let body = StunMessage::body_length(&frame).map_err(io::Error::other)?;
    frame.resize(HEADER_LEN + body, 0);
    stream.read_exact(&mut frame[HEADER_LEN..]).await?;

    let request = StunMessage::decode(&frame).map_err(io::Error::other)?;
    let response = StunMessage::binding_response(
        &request,
        vec![Attribute::xor_address(from, &request.transaction_id)],
    );
    stream.write_all(&response.encode()).await?;
    stream.shutdown().await
}

/// TestTls is a self-signed identity and a client config trusting only it
pub struct TestTls {
    pub acceptor: TlsAcceptor,
    pub client: Arc<ClientConfig>,
}

pub fn test_tls(name: &str) -> TestTls {
    let key_pair = KeyPair::generate().unwrap();
    let cert = CertificateParams::new(vec![name.to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let cert_der = CertificateDer::from(cert.der().to_vec());
    let key_der = PrivateKeyDer::try_from(key_pair.serialize_der()).unwrap();

    let provider = Arc::new(crypto::ring::default_provider());
    let server = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(cert_der).unwrap();
    let client = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TestTls {
        acceptor: TlsAcceptor::from(Arc::new(server)),
        client: Arc::new(client),
    }
}

/// spawn_socks5 runs a SOCKS5 proxy supporting CONNECT and UDP ASSOCIATE.
/// With `login` set it requires username/password authentication
pub async fn spawn_socks5(login: Option<(&str, &str)>) -> SocketAddr {
    let listener = TcpListener::bind((IP1, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let login = login.map(|(u, p)| (u.to_string(), p.to_string()));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let login = login.clone();
            tokio::spawn(async move {
                let _ = serve_socks5(stream, login).await;
            });
        }
    });

    addr
}

async fn serve_socks5(mut stream: TcpStream, login: Option<(String, String)>) -> io::Result<()> {
    let mut hello = [0u8; 2];
    stream.read_exact(&mut hello).await?;
    let mut methods = vec![0u8; hello[1] as usize];
    stream.read_exact(&mut methods).await?;

    match &login {
        Some((username, password)) => {
            if !methods.contains(&0x02) {
                return stream.write_all(&[0x05, 0xFF]).await;
            }
            stream.write_all(&[0x05, 0x02]).await?;

            let mut head = [0u8; 2];
            stream.read_exact(&mut head).await?;
            let mut name = vec![0u8; head[1] as usize];
            stream.read_exact(&mut name).await?;
            let mut plen = [0u8; 1];
            stream.read_exact(&mut plen).await?;
            let mut pass = vec![0u8; plen[0] as usize];
            stream.read_exact(&mut pass).await?;

            let ok = name == username.as_bytes() && pass == password.as_bytes();
            stream.write_all(&[0x01, if ok { 0x00 } else { 0x01 }]).await?;
            if !ok {
                return Ok(());
            }
        }
        None => stream.write_all(&[0x05, 0x00]).await?,
    }

    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    let target = read_target(&mut stream, request[3]).await?;

    match request[1] {
        // CONNECT
        0x01 => {
            let mut upstream = TcpStream::connect(target).await?;
            reply(&mut stream, upstream.local_addr()?).await?;
            copy_bidirectional(&mut stream, &mut upstream).await?;
            Ok(())
        }
        // UDP ASSOCIATE
        0x03 => {
            let relay = UdpSocket::bind((IP1, 0)).await?;
            reply(&mut stream, relay.local_addr()?).await?;
            relay_datagrams(stream, relay).await
        }
        _ => stream.write_all(&[0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await,
    }
}

async fn read_target(stream: &mut TcpStream, atyp: u8) -> io::Result<SocketAddr> {
    let ip = match atyp {
        0x01 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        0x04 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return Err(io::Error::other("unsupported address type")),
    };
    let port = stream.read_u16().await?;
    Ok(SocketAddr::new(ip, port))
}

async fn reply(stream: &mut TcpStream, bound: SocketAddr) -> io::Result<()> {
    let mut reply = vec![0x05, 0x00, 0x00];
    encode_address(bound, &mut reply);
    stream.write_all(&reply).await
}

// The first sender is the client; everything else is a server answering it
async fn relay_datagrams(mut control: TcpStream, relay: UdpSocket) -> io::Result<()> {
    let mut client: Option<SocketAddr> = None;
    let mut buf = vec![0u8; 65_535];
    let mut probe = [0u8; 1];

    loop {
        tokio::select! {
            received = relay.recv_from(&mut buf) => {
                let (n, from) = received?;
                match client {
                    Some(c) if c != from => {
                        relay.send_to(&wrap_datagram(&buf[..n], from), c).await?;
                    }
                    _ => {
                        client = Some(from);
                        if let Ok((target, payload)) = unwrap_datagram(&buf[..n]) {
                            relay.send_to(payload, target).await?;
                        }
                    }
                }
            }
            read = control.read(&mut probe) => {
                if read? == 0 {
                    return Ok(());
                }
            }
        }
    }
}
