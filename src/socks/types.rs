//! Request types: the command and the destination it names

use super::consts::*;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Command byte of a SOCKS5 request
///
/// All three RFC 1928 commands are recognized so the dispatcher can answer
/// BIND and UDP ASSOCIATE properly; only `Connect` is ever served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// Open a TCP connection to the target
    Connect,
    /// Accept an inbound connection on the client's behalf
    Bind,
    /// Relay UDP datagrams
    UdpAssociate,
}

impl SocksCommand {
    /// Name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            SocksCommand::Connect => "CONNECT",
            SocksCommand::Bind => "BIND",
            SocksCommand::UdpAssociate => "UDP ASSOCIATE",
        }
    }
}

impl TryFrom<u8> for SocksCommand {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Ok(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Ok(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Ok(SocksCommand::UdpAssociate),
            other => Err(other),
        }
    }
}

impl From<SocksCommand> for u8 {
    fn from(command: SocksCommand) -> Self {
        match command {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination named by a request
///
/// Literal addresses are kept as a `SocketAddr`. Domain names stay
/// unresolved until dialing, so resolution happens under the connect
/// deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IPv4 or IPv6 address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Domain target
    pub fn domain(host: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(host.into(), port)
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// ATYP byte this address is encoded with
    pub fn atyp(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            TargetAddr::Domain(..) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Bytes taken by ATYP, address and port on the wire
    pub fn encoded_len(&self) -> usize {
        let addr_len = match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => 4,
            TargetAddr::Ip(SocketAddr::V6(_)) => 16,
            TargetAddr::Domain(host, _) => 1 + host.len(),
        };
        1 + addr_len + 2
    }

    /// Every address the target may be reached at, in resolver order
    ///
    /// Literal addresses yield themselves. Names go through the platform
    /// resolver on tokio's blocking pool; an empty answer is `NotFound`.
    pub async fn resolve_all(&self) -> io::Result<Vec<SocketAddr>> {
        let (host, port) = match self {
            TargetAddr::Ip(addr) => return Ok(vec![*addr]),
            TargetAddr::Domain(host, port) => (host.as_str(), *port),
        };

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} resolved to no addresses", host),
            ));
        }
        Ok(addrs)
    }

    /// Append ATYP, address and port in wire format
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.atyp());
        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => buf.put_slice(&addr.ip().octets()),
            TargetAddr::Ip(SocketAddr::V6(addr)) => buf.put_slice(&addr.ip().octets()),
            TargetAddr::Domain(host, _) => {
                // Parsed names come from a one-byte length field
                buf.put_u8(host.len() as u8);
                buf.put_slice(host.as_bytes());
            }
        }
        buf.put_u16(self.port());
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => addr.fmt(f),
            TargetAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl From<(IpAddr, u16)> for TargetAddr {
    fn from(addr: (IpAddr, u16)) -> Self {
        TargetAddr::Ip(SocketAddr::from(addr))
    }
}

/// `0.0.0.0:0`, the bind address reported when none is known
impl Default for TargetAddr {
    fn default() -> Self {
        TargetAddr::Ip(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
    }
}
