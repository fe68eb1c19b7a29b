use crate::transport::ProxyEndpoint;
use crate::transport::socks5::address::{encode_address, parse_address_from_packet};
use crate::transport::socks5::client::{open_control, send_request};
use crate::transport::socks5::protocol::Command;
use anyhow::{Result, anyhow};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info};

// Maximum UDP datagram size
pub const MAX_DGRAM: usize = 65_535;

/// UdpAssociation is an established UDP ASSOCIATE session. The control
/// connection must stay open for as long as the relay is used
pub struct UdpAssociation {
    control: TcpStream,
    socket: UdpSocket,
    relay: SocketAddr,
}

impl UdpAssociation {
    /// associate binds the local UDP socket and asks the proxy for a relay
    pub async fn associate(local: SocketAddr, proxy: &ProxyEndpoint) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        let mut control = open_control(local, proxy).await?;

        // Client address is not known before NAT, so send zeros with our port
        let unspecified = match local.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let client = SocketAddr::new(unspecified, socket.local_addr()?.port());

        let mut relay = send_request(&mut control, Command::UdpAssociate, client).await?;

        // Some proxies answer 0.0.0.0, meaning "same host as the proxy"
        if relay.ip().is_unspecified() {
            relay.set_ip(proxy.addr.ip());
        }

        info!("socks5 UDP ASSOCIATE via {}: relay {}", proxy.addr, relay);

        Ok(Self {
            control,
            socket,
            relay,
        })
    }

    /// relay returns the proxy-side relay address
    pub fn relay(&self) -> SocketAddr {
        self.relay
    }

    /// local_addr returns the bound local UDP address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// send_to wraps `data` for `target` and sends it to the relay
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize> {
        let packet = wrap_datagram(data, target);
        self.socket.send_to(&packet, self.relay).await?;

        debug!("sent {} bytes to {} via relay {}", data.len(), target, self.relay);
        Ok(data.len())
    }

    /// recv_from waits for a relayed datagram, returning the payload length
    /// and the address the payload originally came from
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut packet = vec![0u8; MAX_DGRAM];

        loop {
            let (len, from) = self.socket.recv_from(&mut packet).await?;

            if from != self.relay {
                debug!("dropping datagram from {from}: not the relay");
                continue;
            }

            match unwrap_datagram(&packet[..len]) {
                Ok((source, payload)) => {
                    let n = payload.len().min(buf.len());
                    buf[..n].copy_from_slice(&payload[..n]);
                    return Ok((n, source));
                }
                Err(e) => debug!("dropping relay datagram: {e}"),
            }
        }
    }

    /// close ends the association by shutting the control connection
    pub async fn close(mut self) -> Result<()> {
        self.control.shutdown().await?;
        debug!("socks5 UDP association via {} closed", self.relay);
        Ok(())
    }
}

/// wrap_datagram builds a SOCKS5 UDP request packet
pub fn wrap_datagram(data: &[u8], target: SocketAddr) -> Vec<u8> {
    //  +----+------+------+----------+----------+----------+
    //  |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
    //  +----+------+------+----------+----------+----------+
    //  | 2  |  1   |  1   | Variable |    2     | Variable |
    //  +----+------+------+----------+----------+----------+
    let mut packet = Vec::with_capacity(22 + data.len());

    // RSV -> 2 bytes, FRAG -> single byte
    packet.extend_from_slice(&[0x00, 0x00, 0x00]);

    encode_address(target, &mut packet);
    packet.extend_from_slice(data);
    packet
}

/// unwrap_datagram strips the SOCKS5 UDP header from a relayed packet
pub fn unwrap_datagram(packet: &[u8]) -> Result<(SocketAddr, &[u8])> {
    // Ensure we receive a valid packet
    if packet.len() < 4 {
        return Err(anyhow!("UDP packet too short"));
    }

    // Check for fragmentation
    if packet[2] != 0x00 {
        return Err(anyhow!("UDP fragmentation not supported"));
    }

    // Get address type directly -> skip RSV and FRAG
    let atyp = packet[3];
    let (source, addr_len) = parse_address_from_packet(packet, 4, atyp)?;

    Ok((source, &packet[4 + addr_len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_keeps_payload_and_address() {
        let target: SocketAddr = "[2001:db8::5]:3478".parse().unwrap();
        let packet = wrap_datagram(b"stun", target);

        assert_eq!(&packet[..3], &[0, 0, 0]);
        let (source, payload) = unwrap_datagram(&packet).unwrap();
        assert_eq!(source, target);
        assert_eq!(payload, b"stun");
    }

    #[test]
    fn fragments_are_rejected() {
        let mut packet = wrap_datagram(b"x", "192.0.2.1:1".parse().unwrap());
        packet[2] = 1;
        assert!(unwrap_datagram(&packet).is_err());
        assert!(unwrap_datagram(&[0, 0]).is_err());
    }
}
