//! SOCKS5 protocol implementation
//!
//! Contains the address/port codec shared by every SOCKS5 message shape,
//! the message codec for handshake/command/UDP framing, and the protocol
//! plugin that drives a session's state machine over them.

pub mod codec;
pub mod consts;
pub mod endpoint;
mod plugin;

pub use codec::{
    build_connect_response, build_udp_response, parse_auth_methods, parse_command_request,
    parse_password_auth, parse_udp_envelope,
};
pub use endpoint::{decode_endpoint, encode_endpoint, DomainResolver, Endpoint, SystemResolver};
pub use plugin::{Socks5Config, Socks5Plugin, SOCKS5_ACCESS, SOCKS5_PLUGIN_ID};
