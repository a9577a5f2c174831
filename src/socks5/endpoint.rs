//! Address/port codec for SOCKS5 endpoints
//!
//! Encodes and decodes the address-type-tagged endpoint format shared by
//! command requests, UDP envelopes and replies: a one-byte tag (IPv4=1,
//! Domain=3, IPv6=4), the address bytes, then a big-endian port.

use crate::error::{ensure_len, CodecError};
use crate::socks5::consts::*;
use anyhow::{Context, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A SOCKS5 endpoint: an IP socket address or an unresolved domain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port, not yet resolved
    Domain(String, u16),
}

impl Endpoint {
    /// Create an endpoint from an IPv4 address and port.
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an endpoint from an IPv6 address and port.
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        Endpoint::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create an endpoint from a domain name and port.
    pub fn domain(domain: String, port: u16) -> Self {
        Endpoint::Domain(domain, port)
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        match self {
            Endpoint::Ip(addr) => addr.port(),
            Endpoint::Domain(_, port) => *port,
        }
    }

    /// Raw address octets: 4 bytes for IPv4, 16 for IPv6, empty for domains.
    pub fn address_octets(&self) -> Vec<u8> {
        match self {
            Endpoint::Ip(SocketAddr::V4(addr)) => addr.ip().octets().to_vec(),
            Endpoint::Ip(SocketAddr::V6(addr)) => addr.ip().octets().to_vec(),
            Endpoint::Domain(_, _) => Vec::new(),
        }
    }

    /// The SOCKS5 address-type tag for this endpoint.
    pub fn addr_type(&self) -> u8 {
        match self {
            Endpoint::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            Endpoint::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            Endpoint::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Resolve the endpoint to a socket address.
    ///
    /// IP endpoints return immediately; domains go through DNS.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            Endpoint::Ip(addr) => Ok(*addr),
            Endpoint::Domain(domain, port) => {
                let addr_str = format!("{}:{}", domain, port);
                let resolved = tokio::net::lookup_host(&addr_str)
                    .await
                    .with_context(|| format!("Failed to resolve domain: {}", domain))?
                    .next()
                    .with_context(|| format!("No addresses found for domain: {}", domain))?;
                Ok(resolved)
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ip(addr) => write!(f, "{}", addr),
            Endpoint::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

/// Synchronous resolver for domain-typed endpoints.
///
/// The parse pipeline never suspends, so plugins that must resolve a domain
/// before firewall evaluation go through this seam instead of async DNS.
pub trait DomainResolver: Send + Sync {
    /// Resolve `domain` to an IP address, or fail with
    /// [`CodecError::DomainResolutionFailed`].
    fn resolve(&self, domain: &str, port: u16) -> Result<SocketAddr, CodecError>;
}

/// Resolver backed by the operating system's blocking lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl DomainResolver for SystemResolver {
    fn resolve(&self, domain: &str, port: u16) -> Result<SocketAddr, CodecError> {
        use std::net::ToSocketAddrs;

        (domain, port)
            .to_socket_addrs()
            .map_err(|e| CodecError::DomainResolutionFailed(format!("{}: {}", domain, e)))?
            .next()
            .ok_or_else(|| {
                CodecError::DomainResolutionFailed(format!("no addresses for {}", domain))
            })
    }
}

/// Decode a tagged endpoint from the front of `buf`.
///
/// Returns the endpoint and the number of bytes consumed. Domain endpoints
/// are returned unresolved; the caller decides when and how to resolve them.
pub fn decode_endpoint(buf: &[u8]) -> Result<(Endpoint, usize), CodecError> {
    ensure_len(buf, 1)?;

    match buf[0] {
        SOCKS5_ADDR_TYPE_IPV4 => {
            ensure_len(buf, 1 + 4 + 2)?;
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[1..5]);
            let port = u16::from_be_bytes([buf[5], buf[6]]);
            Ok((Endpoint::ipv4(Ipv4Addr::from(octets), port), 7))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            ensure_len(buf, 2)?;
            let len = buf[1] as usize;
            ensure_len(buf, 2 + len + 2)?;
            let domain = std::str::from_utf8(&buf[2..2 + len])
                .map_err(|_| CodecError::MalformedAddress(SOCKS5_ADDR_TYPE_DOMAIN))?
                .to_string();
            let port = u16::from_be_bytes([buf[2 + len], buf[2 + len + 1]]);
            Ok((Endpoint::domain(domain, port), 2 + len + 2))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            ensure_len(buf, 1 + 16 + 2)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[1..17]);
            let port = u16::from_be_bytes([buf[17], buf[18]]);
            Ok((Endpoint::ipv6(Ipv6Addr::from(octets), port), 19))
        }

        other => Err(CodecError::MalformedAddress(other)),
    }
}

/// Encode an endpoint as tag + address + big-endian port.
///
/// Replies only ever carry IP addresses, but domain encoding is kept for
/// symmetry with the decoder.
pub fn encode_endpoint(endpoint: &Endpoint) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.push(endpoint.addr_type());

    match endpoint {
        Endpoint::Ip(SocketAddr::V4(addr)) => {
            bytes.extend_from_slice(&addr.ip().octets());
        }
        Endpoint::Ip(SocketAddr::V6(addr)) => {
            bytes.extend_from_slice(&addr.ip().octets());
        }
        Endpoint::Domain(domain, _) => {
            bytes.push(domain.len() as u8);
            bytes.extend_from_slice(domain.as_bytes());
        }
    }

    bytes.extend_from_slice(&endpoint.port().to_be_bytes());
    bytes
}
