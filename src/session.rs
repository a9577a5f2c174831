//! Per-session state shared between codec, plugins and validators.
//!
//! A [`SessionDescriptor`] carries everything the front-end knows about one
//! in-flight proxy attempt. One descriptor is never shared between sessions;
//! plugins own its payload exclusively while processing the current step.

use bytes::Bytes;
use std::fmt;

/// Opaque handle identifying the originating transport session.
///
/// The transport layer mints these; the front-end only carries them through
/// to the service-access validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Stage of a session's protocol state machine.
///
/// The concrete stage sequence is plugin-defined; SOCKS5 walks
/// Auth -> (AuthSubNegotiation) -> Command -> Forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProxyStep {
    /// Authentication method negotiation
    Auth,
    /// Username/password sub-negotiation
    AuthSubNegotiation,
    /// Command request (CONNECT / BIND / UDP ASSOCIATE)
    Command,
    /// Established; payloads flow to/from the target
    Forwarding,
}

/// Requested proxy operation, valid once `step >= Command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyCommand {
    /// Establish a TCP connection to the target
    Connect,
    /// Wait for an inbound connection
    Bind,
    /// Establish a UDP relay
    UdpAssociate,
}

impl ProxyCommand {
    /// Parse a SOCKS5 command byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ProxyCommand::Connect),
            2 => Some(ProxyCommand::Bind),
            3 => Some(ProxyCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Wire representation of this command.
    pub fn to_byte(self) -> u8 {
        match self {
            ProxyCommand::Connect => 1,
            ProxyCommand::Bind => 2,
            ProxyCommand::UdpAssociate => 3,
        }
    }
}

impl fmt::Display for ProxyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyCommand::Connect => write!(f, "CONNECT"),
            ProxyCommand::Bind => write!(f, "BIND"),
            ProxyCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// State of one in-flight proxy attempt.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    /// Which protocol plugin owns this session
    pub plugin_id: u8,
    /// Current protocol stage
    pub step: ProxyStep,
    /// Requested operation, meaningful once `step >= Command`
    pub command: ProxyCommand,
    /// Raw target address bytes: 4 (IPv4) or 16 (IPv6).
    /// Domain names are resolved to one of these before firewall evaluation;
    /// any other length bypasses IP-based rules.
    pub target_address: Bytes,
    /// Target port, host byte order
    pub target_port: u16,
    /// Originating transport session
    pub connection_id: ConnectionId,
    /// Payload currently being processed; exclusively owned by the plugin
    /// handling the current step
    pub payload: Bytes,
}

impl SessionDescriptor {
    /// Create a fresh descriptor at the Auth step for `plugin_id`.
    pub fn new(plugin_id: u8, connection_id: ConnectionId) -> Self {
        SessionDescriptor {
            plugin_id,
            step: ProxyStep::Auth,
            command: ProxyCommand::Connect,
            target_address: Bytes::new(),
            target_port: 0,
            connection_id,
            payload: Bytes::new(),
        }
    }

    /// Whether the target address is IP-addressable (IPv4 or IPv6 bytes).
    pub fn has_ip_target(&self) -> bool {
        matches!(self.target_address.len(), 4 | 16)
    }
}
