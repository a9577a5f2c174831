//! SOCKS5 message codec
//!
//! Parses auth negotiation, command requests and UDP envelopes from raw
//! buffers and builds the matching replies. All parsers are synchronous
//! transforms over in-memory bytes; truncated input fails with a
//! recoverable [`CodecError::Truncated`] so the caller can wait for more.

use crate::error::{ensure_len, CodecError};
use crate::session::ProxyCommand;
use crate::socks5::consts::*;
use crate::socks5::endpoint::{decode_endpoint, Endpoint};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddr;

/// Parse the auth-method negotiation message.
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// The version byte is carried but not interpreted here. Returns the raw
/// method codes offered by the client.
pub fn parse_auth_methods(buf: &[u8]) -> Result<Vec<u8>, CodecError> {
    ensure_len(buf, 2)?;
    let n = buf[1] as usize;
    ensure_len(buf, 2 + n)?;
    Ok(buf[2..2 + n].to_vec())
}

/// Parse the username/password sub-negotiation message.
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
pub fn parse_password_auth(buf: &[u8]) -> Result<(String, String), CodecError> {
    ensure_len(buf, 2)?;
    let ulen = buf[1] as usize;
    ensure_len(buf, 2 + ulen + 1)?;
    let plen = buf[2 + ulen] as usize;
    ensure_len(buf, 2 + ulen + 1 + plen)?;

    let username = String::from_utf8_lossy(&buf[2..2 + ulen]).into_owned();
    let password = String::from_utf8_lossy(&buf[2 + ulen + 1..2 + ulen + 1 + plen]).into_owned();
    Ok((username, password))
}

/// Parse a command request into its command and target endpoint.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Domain endpoints come back unresolved. An unknown command byte fails
/// with [`CodecError::UnsupportedCommand`].
pub fn parse_command_request(buf: &[u8]) -> Result<(ProxyCommand, Endpoint), CodecError> {
    ensure_len(buf, 4)?;

    let command =
        ProxyCommand::from_byte(buf[1]).ok_or(CodecError::UnsupportedCommand(buf[1]))?;
    let (endpoint, _) = decode_endpoint(&buf[3..])?;

    tracing::debug!("parsed command request: {} to {}", command, endpoint);
    Ok((command, endpoint))
}

/// Parse a UDP encapsulation envelope.
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
///
/// The fragmentation byte is carried through uninterpreted. The returned
/// payload is a zero-copy slice of `buf`.
pub fn parse_udp_envelope(buf: &Bytes) -> Result<(Endpoint, Bytes), CodecError> {
    ensure_len(buf, 4)?;
    let (endpoint, consumed) = decode_endpoint(&buf[3..])?;
    Ok((endpoint, buf.slice(3 + consumed..)))
}

/// Build a CONNECT/BIND/UDP ASSOCIATE reply.
///
/// Emits version, reply code, reserved, then the bound endpoint in tagged
/// form. Total length is `6 + address_length`.
pub fn build_connect_response(bound: &SocketAddr, reply_code: u8) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(reply_code);
    buf.put_u8(SOCKS5_RESERVED);
    put_socket_addr(&mut buf, bound);
    buf.to_vec()
}

/// Build a UDP response envelope around `payload`.
///
/// Emits two reserved bytes, a zero fragmentation byte, the tagged bound
/// endpoint, then the payload verbatim.
pub fn build_udp_response(bound: &SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + 16 + 2 + payload.len());
    buf.put_u16(0); // RSV
    buf.put_u8(0); // FRAG
    put_socket_addr(&mut buf, bound);
    buf.extend_from_slice(payload);
    buf.to_vec()
}

/// Append ATYP + address + big-endian port for an IP socket address.
fn put_socket_addr(buf: &mut BytesMut, addr: &SocketAddr) {
    match addr {
        SocketAddr::V4(v4) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
            buf.extend_from_slice(&v4.ip().octets());
        }
        SocketAddr::V6(v6) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
            buf.extend_from_slice(&v6.ip().octets());
        }
    }
    buf.put_u16(addr.port());
}
