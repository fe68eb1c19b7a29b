use crate::transport::socks5::protocol::AddressType;
use anyhow::{Result, anyhow};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// encode_address appends ATYP, address and port of `addr` to `buf`
pub fn encode_address(addr: SocketAddr, buf: &mut Vec<u8>) {
    match addr {
        SocketAddr::V4(v4_addr) => {
            // ATYP -> 1 byte
            buf.push(AddressType::IPv4 as u8);

            // Address -> 4 bytes
            buf.extend_from_slice(&v4_addr.ip().octets());

            // Port in BE -> 2 bytes
            buf.extend_from_slice(&v4_addr.port().to_be_bytes());
        }
        SocketAddr::V6(v6_addr) => {
            // ATYP -> 1 byte
            buf.push(AddressType::IPv6 as u8);

            // Address -> 16 bytes
            buf.extend_from_slice(&v6_addr.ip().octets());

            // Port in BE -> 2 bytes
            buf.extend_from_slice(&v6_addr.port().to_be_bytes());
        }
    }
}

/// read_address reads ATYP, address and port from a proxy reply.
/// Domain names are resolved, keeping the first address
pub async fn read_address<R>(stream: &mut R) -> Result<SocketAddr>
where
    R: AsyncRead + Unpin,
{
    // Read address type byte from stream
    let mut atype = [0u8; 1];
    stream.read_exact(&mut atype).await?;

    let addr_type = AddressType::from_byte(atype[0])
        .ok_or_else(|| anyhow!("[ERR] unknown address type: {}", atype[0]))?;

    let addr = match addr_type {
        AddressType::IPv4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let ip = Ipv4Addr::from(addr);
            SocketAddr::from((ip, read_port(stream).await?))
        }
        AddressType::DomainName => {
            // First octet in DomainName contains the number of
            // octets to follow
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;

            let mut domain = vec![0u8; len[0] as usize];
            stream.read_exact(&mut domain).await?;
            let domain = String::from_utf8(domain)?;
            let port = read_port(stream).await?;

            tokio::net::lookup_host((domain.as_str(), port))
                .await
                .map_err(|e| anyhow!("[ERR] failed to resolve bound host '{domain}': {e}"))?
                .next()
                .ok_or_else(|| anyhow!("[ERR] no IP address found for '{domain}'"))?
        }
        AddressType::IPv6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let ip = Ipv6Addr::from(addr);
            SocketAddr::from((ip, read_port(stream).await?))
        }
    };

    Ok(addr)
}

async fn read_port<R>(stream: &mut R) -> Result<u16>
where
    R: AsyncRead + Unpin,
{
    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf).await?;
    Ok(u16::from_be_bytes(port_buf))
}

/// parse_address_from_packet parses the address of a UDP relay datagram
/// and returns it with the number of bytes consumed
pub fn parse_address_from_packet(
    packet: &[u8],
    start_offset: usize,
    atyp: u8,
) -> Result<(SocketAddr, usize)> {
    // Set offset to maintain start
    let mut offset = start_offset;

    let addr = match AddressType::from_byte(atyp) {
        Some(AddressType::IPv4) => parse_ipv4_address(packet, &mut offset)?,
        Some(AddressType::IPv6) => parse_ipv6_address(packet, &mut offset)?,
        Some(AddressType::DomainName) => {
            return Err(anyhow!("domain source address in relay datagram"));
        }
        None => return Err(anyhow!("unknown address type: {atyp}")),
    };

    Ok((addr, offset - start_offset))
}

/// parse_ipv4_address parses an IPv4 address and port from a byte slice
fn parse_ipv4_address(data: &[u8], offset: &mut usize) -> Result<SocketAddr> {
    // Ensure we have enough data for an IPv4 address + port (6 bytes)
    if *offset + 6 > data.len() {
        return Err(anyhow!("not enough data for IPv4 address and port"));
    }

    let ip_bytes: [u8; 4] = data[*offset..*offset + 4]
        .try_into()
        .map_err(|_| anyhow!("invalid IPv4 bytes"))?;
    *offset += 4;

    // Grab port -> BigEndian (network order)
    let port = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;

    Ok(SocketAddr::from((Ipv4Addr::from(ip_bytes), port)))
}

/// parse_ipv6_address parses an IPv6 address and port from a byte slice
fn parse_ipv6_address(data: &[u8], offset: &mut usize) -> Result<SocketAddr> {
    // Ensure we have enough data for an IPv6 address + port (18 bytes)
    if *offset + 18 > data.len() {
        return Err(anyhow!("not enough data for IPv6 address and port"));
    }

    let ip_bytes: [u8; 16] = data[*offset..*offset + 16]
        .try_into()
        .map_err(|_| anyhow!("invalid IPv6 bytes"))?;
    *offset += 16;

    let port = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;

    Ok(SocketAddr::from((Ipv6Addr::from(ip_bytes), port)))
}
