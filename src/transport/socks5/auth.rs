use crate::credential::ProxyCredential;
use crate::error::Error;
use crate::transport::socks5::protocol::{AuthMethod, AuthStatus, USERPASS_VERSION, Version};
use anyhow::{Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// negotiate_auth handles authentication negotiation with the SOCKS server
pub async fn negotiate_auth<S>(stream: &mut S, credential: Option<&ProxyCredential>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+
    stream.write_all(&client_hello(credential.is_some())).await?;

    // ServerChoice method selection reply format
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    // Ensure version is 0x05 -> SOCKS5
    if buf[0] != Version::SOCKS5 as u8 {
        bail!(Error::Socks5(format!("not SOCKS5 (version {})", buf[0])));
    }

    debug!("socks5 server selected auth method {:#04x}", buf[1]);

    // Route to appropriate auth handler
    match (AuthMethod::from_byte(buf[1]), credential) {
        (Some(AuthMethod::NoAuth), _) => Ok(()),
        (Some(AuthMethod::UserPass), Some(cred)) => authenticate_userpass(stream, cred).await,
        (Some(AuthMethod::UserPass), None) => {
            bail!(Error::Socks5("server requires username/password".into()))
        }
        _ => bail!(Error::Socks5("no acceptable authentication method".into())),
    }
}

/// client_hello lists the methods offered, user/pass first when available
fn client_hello(with_userpass: bool) -> Vec<u8> {
    let mut hello = vec![Version::SOCKS5 as u8];
    if with_userpass {
        hello.extend_from_slice(&[2, AuthMethod::UserPass as u8, AuthMethod::NoAuth as u8]);
    } else {
        hello.extend_from_slice(&[1, AuthMethod::NoAuth as u8]);
    }
    hello
}

/// authenticate_userpass performs the RFC 1929 sub-negotiation
async fn authenticate_userpass<S>(stream: &mut S, cred: &ProxyCredential) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Client Username/Password Request
    // +----+------+----------+------+----------+
    // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    // +----+------+----------+------+----------+
    // | 1  |  1   | 0 to 255 |  1   | 0 to 255 |
    // +----+------+----------+------+----------+
    let username = cred.username.as_bytes();
    let password = cred.password.as_bytes();

    // An empty password is sent as PLEN=0 and left to the proxy to judge
    if username.len() > 255 {
        bail!(Error::Socks5("username longer than 255 bytes".into()));
    }
    if password.len() > 255 {
        bail!(Error::Socks5("password longer than 255 bytes".into()));
    }

    let mut request = Vec::with_capacity(3 + username.len() + password.len());
    request.push(USERPASS_VERSION);
    request.push(username.len() as u8);
    request.extend_from_slice(username);
    request.push(password.len() as u8);
    request.extend_from_slice(password);
    stream.write_all(&request).await?;

    // Username/Password Server response
    // +----+--------+
    // |VER | STATUS |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;

    if reply[0] != USERPASS_VERSION {
        bail!(Error::Socks5(format!(
            "invalid username/password sub-negotiation version {}",
            reply[0]
        )));
    }

    match AuthStatus::from_byte(reply[1]) {
        AuthStatus::Success => Ok(()),
        AuthStatus::Failure => bail!(Error::Socks5(format!(
            "authentication failed (status {:#04x})",
            reply[1]
        ))),
    }
}
