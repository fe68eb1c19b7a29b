use crate::error::Error;
use crate::transport::ProxyEndpoint;
use crate::transport::socks5::address::{encode_address, read_address};
use crate::transport::socks5::auth::negotiate_auth;
use crate::transport::socks5::protocol::{Command, RSV, ReplyCode, Version};
use crate::transport::tcp::connect_from;
use anyhow::{Result, bail};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// connect opens a TCP stream to `target` tunneled through the proxy.
/// The returned stream carries the target's bytes once the reply succeeded
pub async fn connect(
    local: SocketAddr,
    proxy: &ProxyEndpoint,
    target: SocketAddr,
) -> Result<TcpStream> {
    let mut stream = open_control(local, proxy).await?;

    let bound = send_request(&mut stream, Command::Connect, target).await?;
    info!("socks5 CONNECT {} via {} (bound {})", target, proxy.addr, bound);

    Ok(stream)
}

/// open_control connects to the proxy and completes authentication
pub async fn open_control(local: SocketAddr, proxy: &ProxyEndpoint) -> Result<TcpStream> {
    let mut stream = connect_from(local, proxy.addr).await?;
    debug!("connected to socks5 proxy {}", proxy.addr);

    negotiate_auth(&mut stream, proxy.credential.as_ref()).await?;
    Ok(stream)
}

/// send_request issues a SOCKS5 command and returns BND.ADDR:BND.PORT
pub async fn send_request<S>(
    stream: &mut S,
    command: Command,
    target: SocketAddr,
) -> Result<SocketAddr>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // SOCKS5 request format
    // +----+-----+-------+------+----------+----------+
    // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    let mut request = vec![Version::SOCKS5 as u8, command as u8, RSV];
    encode_address(target, &mut request);
    stream.write_all(&request).await?;

    // SOCKS5 reply format
    // +----+-----+-------+------+----------+----------+
    // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    let mut head = [0u8; 3];
    stream.read_exact(&mut head).await?;

    if head[0] != Version::SOCKS5 as u8 {
        bail!(Error::Socks5(format!("not SOCKS5 (version {})", head[0])));
    }

    match ReplyCode::from_byte(head[1]) {
        Some(ReplyCode::Succeeded) => (),
        Some(code) => bail!(Error::Socks5(format!("{command:?} refused: {code}"))),
        None => bail!(Error::Socks5(format!(
            "{command:?} refused: unassigned reply {:#04x}",
            head[1]
        ))),
    }

    read_address(stream).await
}
