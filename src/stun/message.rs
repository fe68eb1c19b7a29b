use crate::error::Error;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

// STUN constants
pub const MAGIC_COOKIE: u32 = 0x2112A442;
pub const HEADER_LEN: usize = 20;
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_RESPONSE: u16 = 0x0101;
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;

// Attribute types
pub const MAPPED_ADDRESS: u16 = 0x0001;
pub const CHANGE_REQUEST: u16 = 0x0003;
pub const SOURCE_ADDRESS: u16 = 0x0004;
pub const CHANGED_ADDRESS: u16 = 0x0005;
pub const XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const RESPONSE_ORIGIN: u16 = 0x802B;
pub const OTHER_ADDRESS: u16 = 0x802C;

// Address families
pub const FAMILY_IPV4: u8 = 0x01;
pub const FAMILY_IPV6: u8 = 0x02;

// CHANGE-REQUEST flags
const CHANGE_IP: u32 = 0x04;
const CHANGE_PORT: u32 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    pub fn random() -> Self {
        TransactionId(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl From<[u8; 12]> for TransactionId {
    fn from(bytes: [u8; 12]) -> Self {
        TransactionId(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attr_type: u16,
    pub value: Vec<u8>,
}

impl Attribute {
    /// address encodes a plain address attribute (MAPPED-ADDRESS and friends)
    pub fn address(attr_type: u16, addr: SocketAddr) -> Self {
        let mut value = vec![0u8];
        match addr.ip() {
            IpAddr::V4(ip) => {
                value.push(FAMILY_IPV4);
                value.extend_from_slice(&addr.port().to_be_bytes());
                value.extend_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                value.push(FAMILY_IPV6);
                value.extend_from_slice(&addr.port().to_be_bytes());
                value.extend_from_slice(&ip.octets());
            }
        }
        Attribute { attr_type, value }
    }

    /// xor_address encodes XOR-MAPPED-ADDRESS for `transaction_id`
    pub fn xor_address(addr: SocketAddr, transaction_id: &TransactionId) -> Self {
        let mut plain = Attribute::address(XOR_MAPPED_ADDRESS, addr);
        xor_value(&mut plain.value, transaction_id);
        plain
    }

    /// change_request asks the server to answer from another IP and/or port
    pub fn change_request(change_ip: bool, change_port: bool) -> Self {
        let mut flags = 0u32;
        if change_ip {
            flags |= CHANGE_IP;
        }
        if change_port {
            flags |= CHANGE_PORT;
        }
        Attribute {
            attr_type: CHANGE_REQUEST,
            value: flags.to_be_bytes().to_vec(),
        }
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.attr_type.to_be_bytes());
        buffer.extend_from_slice(&(self.value.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&self.value);

        // Pad to multiple of 4 bytes
        let padding = (4 - (self.value.len() % 4)) % 4;
        buffer.resize(buffer.len() + padding, 0);
    }

    /// decode reads one attribute and returns it with its padded size
    pub fn decode(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.len() < 4 {
            return Err(Error::Stun("attribute too short"));
        }

        let attr_type = u16::from_be_bytes([data[0], data[1]]);
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;

        if data.len() < 4 + length {
            return Err(Error::Stun("invalid attribute length"));
        }

        let attr = Attribute {
            attr_type,
            value: data[4..4 + length].to_vec(),
        };
        Ok((attr, (4 + length + 3) & !3))
    }

    /// socket_addr decodes a plain address attribute value
    pub fn socket_addr(&self) -> Result<SocketAddr, Error> {
        decode_address(&self.value)
    }

    /// xor_socket_addr decodes an XOR-MAPPED-ADDRESS value
    pub fn xor_socket_addr(&self, transaction_id: &TransactionId) -> Result<SocketAddr, Error> {
        let mut value = self.value.clone();
        xor_value(&mut value, transaction_id);
        decode_address(&value)
    }
}

// XOR port with the top half of the cookie, address with cookie + transaction id
fn xor_value(value: &mut [u8], transaction_id: &TransactionId) {
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let mut key = [0u8; 16];
    key[0..4].copy_from_slice(&cookie);
    key[4..16].copy_from_slice(transaction_id.as_bytes());

    if value.len() >= 4 {
        value[2] ^= cookie[0];
        value[3] ^= cookie[1];
    }
    for (byte, k) in value.iter_mut().skip(4).zip(key.iter()) {
        *byte ^= k;
    }
}

fn decode_address(value: &[u8]) -> Result<SocketAddr, Error> {
    if value.len() < 4 {
        return Err(Error::Stun("invalid address length"));
    }

    let family = value[1];
    let port = u16::from_be_bytes([value[2], value[3]]);

    match family {
        FAMILY_IPV4 => {
            let octets: [u8; 4] = value
                .get(4..8)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::Stun("invalid address length"))?;
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        FAMILY_IPV6 => {
            let octets: [u8; 16] = value
                .get(4..20)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::Stun("invalid address length"))?;
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(Error::Stun("unsupported address family")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub message_type: u16,
    pub transaction_id: TransactionId,
    pub attributes: Vec<Attribute>,
}

impl StunMessage {
    pub fn binding_request() -> Self {
        StunMessage {
            message_type: BINDING_REQUEST,
            transaction_id: TransactionId::random(),
            attributes: Vec::new(),
        }
    }

    /// binding_request_changed is a binding request carrying CHANGE-REQUEST
    pub fn binding_request_changed(change_ip: bool, change_port: bool) -> Self {
        let mut msg = Self::binding_request();
        msg.attributes
            .push(Attribute::change_request(change_ip, change_port));
        msg
    }

    /// binding_response answers `request` with the given attributes
    pub fn binding_response(request: &StunMessage, attributes: Vec<Attribute>) -> Self {
        StunMessage {
            message_type: BINDING_RESPONSE,
            transaction_id: request.transaction_id,
            attributes,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for attr in &self.attributes {
            attr.encode(&mut body);
        }

        let mut buffer = Vec::with_capacity(HEADER_LEN + body.len());
        buffer.extend_from_slice(&self.message_type.to_be_bytes());
        buffer.extend_from_slice(&(body.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buffer.extend_from_slice(self.transaction_id.as_bytes());
        buffer.extend_from_slice(&body);
        buffer
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let length = Self::body_length(data)?;

        if data.len() < HEADER_LEN + length {
            return Err(Error::Stun("invalid message length"));
        }

        let message_type = u16::from_be_bytes([data[0], data[1]]);
        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&data[8..20]);

        let mut attributes = Vec::new();
        let mut offset = HEADER_LEN;
        let end = HEADER_LEN + length;

        while offset < end {
            let (attr, size) = Attribute::decode(&data[offset..end])?;
            offset += size;
            attributes.push(attr);
        }

        Ok(StunMessage {
            message_type,
            transaction_id: TransactionId(transaction_id),
            attributes,
        })
    }

    /// body_length validates a header and returns the attribute section length
    pub fn body_length(header: &[u8]) -> Result<usize, Error> {
        if header.len() < HEADER_LEN {
            return Err(Error::Stun("message too short"));
        }

        // Check first two bits are 0
        if header[0] & 0xC0 != 0 {
            return Err(Error::Stun("invalid message"));
        }

        let magic = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if magic != MAGIC_COOKIE {
            return Err(Error::Stun("invalid magic cookie"));
        }

        Ok(u16::from_be_bytes([header[2], header[3]]) as usize)
    }

    pub fn attribute(&self, attr_type: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    fn address_of(&self, attr_type: u16) -> Option<SocketAddr> {
        self.attribute(attr_type)?.socket_addr().ok()
    }

    pub fn mapped_address(&self) -> Option<SocketAddr> {
        self.address_of(MAPPED_ADDRESS)
    }

    pub fn xor_mapped_address(&self) -> Option<SocketAddr> {
        self.attribute(XOR_MAPPED_ADDRESS)?
            .xor_socket_addr(&self.transaction_id)
            .ok()
    }

    pub fn changed_address(&self) -> Option<SocketAddr> {
        self.address_of(CHANGED_ADDRESS)
    }

    pub fn other_address(&self) -> Option<SocketAddr> {
        self.address_of(OTHER_ADDRESS)
    }

    pub fn response_origin(&self) -> Option<SocketAddr> {
        self.address_of(RESPONSE_ORIGIN)
            .or_else(|| self.address_of(SOURCE_ADDRESS))
    }

    /// requested_change returns the (change IP, change port) flags of a
    /// request, both false when it carries no CHANGE-REQUEST
    pub fn requested_change(&self) -> (bool, bool) {
        let flags = self
            .attribute(CHANGE_REQUEST)
            .and_then(|attr| attr.value.get(..4))
            .map_or(0, |v| u32::from_be_bytes([v[0], v[1], v[2], v[3]]));
        (flags & CHANGE_IP != 0, flags & CHANGE_PORT != 0)
    }
}
