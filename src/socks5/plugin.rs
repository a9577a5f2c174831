//! SOCKS5 protocol plugin
//!
//! Drives one SOCKS5 session through Auth -> (AuthSubNegotiation) ->
//! Command -> Forwarding, rewriting the session payload in place. Replies
//! produced during the handshake stay with the originator
//! (`handle_request_data` returns `false`); parsed command requests and UDP
//! datagrams are forwarded once the validator chain passes.

use crate::error::CodecError;
use crate::plugin::{BufferSize, ProxyPlugin, ValidateResult};
use crate::session::{ProxyCommand, ProxyStep, SessionDescriptor};
use crate::socks5::codec::*;
use crate::socks5::consts::*;
use crate::socks5::endpoint::{DomainResolver, Endpoint, SystemResolver};
use bytes::Bytes;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

/// Plugin identifier the SOCKS5 plugin registers under.
pub const SOCKS5_PLUGIN_ID: u8 = 1;

/// Capability token the service-access validator checks for SOCKS5 sessions.
pub const SOCKS5_ACCESS: u32 = 0x0000_0004;

/// SOCKS5 plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Socks5Config {
    /// Whether sessions bypass the service-access check
    pub connect_enabled: bool,
    /// Require username/password authentication
    pub auth_required: bool,
    /// Expected username when authentication is required
    pub username: Option<String>,
    /// Expected password when authentication is required
    pub password: Option<String>,
}

impl Default for Socks5Config {
    fn default() -> Self {
        Socks5Config {
            connect_enabled: true,
            auth_required: false,
            username: None,
            password: None,
        }
    }
}

/// The SOCKS5 protocol plugin.
pub struct Socks5Plugin {
    config: Socks5Config,
    resolver: Arc<dyn DomainResolver>,
}

impl std::fmt::Debug for Socks5Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socks5Plugin")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Socks5Plugin {
    /// Create a plugin with the system resolver.
    pub fn new(config: Socks5Config) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Create a plugin with a custom domain resolver.
    pub fn with_resolver(config: Socks5Config, resolver: Arc<dyn DomainResolver>) -> Self {
        Socks5Plugin { config, resolver }
    }

    /// Select the auth method reply for the methods a client offered.
    fn select_auth_method(&self, methods: &[u8]) -> u8 {
        if self.config.auth_required {
            if methods.contains(&SOCKS5_AUTH_METHOD_PASSWORD) {
                SOCKS5_AUTH_METHOD_PASSWORD
            } else {
                SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE
            }
        } else if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
            SOCKS5_AUTH_METHOD_NONE
        } else {
            SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE
        }
    }

    fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.config.username.as_deref() == Some(username)
            && self.config.password.as_deref() == Some(password)
    }

    /// Resolve an endpoint into raw address bytes and port.
    fn resolve_target(&self, endpoint: &Endpoint) -> Result<(Bytes, u16), CodecError> {
        let addr = match endpoint {
            Endpoint::Ip(addr) => *addr,
            Endpoint::Domain(domain, port) => self.resolver.resolve(domain, *port)?,
        };
        let octets = match addr.ip() {
            IpAddr::V4(ip) => Bytes::copy_from_slice(&ip.octets()),
            IpAddr::V6(ip) => Bytes::copy_from_slice(&ip.octets()),
        };
        Ok((octets, addr.port()))
    }

    fn bound_endpoint(session: &SessionDescriptor) -> SocketAddr {
        match session.target_address.len() {
            4 => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&session.target_address);
                SocketAddr::new(IpAddr::V4(octets.into()), session.target_port)
            }
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&session.target_address);
                SocketAddr::new(IpAddr::V6(octets.into()), session.target_port)
            }
            _ => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        }
    }

    /// Put a handshake failure reply in the payload.
    fn reject_with(session: &mut SessionDescriptor, reply_code: u8) -> bool {
        let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        session.payload = Bytes::from(build_connect_response(&unspecified, reply_code));
        false
    }
}

impl ProxyPlugin for Socks5Plugin {
    fn id(&self) -> u8 {
        SOCKS5_PLUGIN_ID
    }

    fn connect_enabled(&self) -> bool {
        self.config.connect_enabled
    }

    fn buffer_size(&self) -> BufferSize {
        BufferSize::Kb8
    }

    fn access_capability(&self) -> u32 {
        SOCKS5_ACCESS
    }

    fn validate_data(&self, session: &SessionDescriptor) -> ValidateResult {
        let result = match session.step {
            ProxyStep::Auth => parse_auth_methods(&session.payload).map(|_| ()),
            ProxyStep::AuthSubNegotiation => parse_password_auth(&session.payload).map(|_| ()),
            ProxyStep::Command => parse_command_request(&session.payload).map(|_| ()),
            ProxyStep::Forwarding => {
                if session.command == ProxyCommand::UdpAssociate {
                    parse_udp_envelope(&session.payload).map(|_| ())
                } else {
                    // Raw TCP payloads have no framing to check
                    Ok(())
                }
            }
        };

        match result {
            Ok(()) => ValidateResult::Success,
            Err(err) if err.is_recoverable() => ValidateResult::Incomplete,
            Err(_) => ValidateResult::Error,
        }
    }

    fn handle_request_data(&self, session: &mut SessionDescriptor) -> bool {
        match session.step {
            ProxyStep::Auth => {
                let methods = match parse_auth_methods(&session.payload) {
                    Ok(methods) => methods,
                    Err(err) => {
                        warn!("{}: bad auth negotiation: {}", session.connection_id, err);
                        return Self::reject_with(session, SOCKS5_REPLY_GENERAL_FAILURE);
                    }
                };

                let method = self.select_auth_method(&methods);
                session.payload = Bytes::from(vec![SOCKS5_VERSION, method]);
                match method {
                    SOCKS5_AUTH_METHOD_PASSWORD => {
                        session.step = ProxyStep::AuthSubNegotiation;
                    }
                    SOCKS5_AUTH_METHOD_NONE => {
                        session.step = ProxyStep::Command;
                    }
                    _ => {} // no acceptable method; session stalls here
                }
                false
            }

            ProxyStep::AuthSubNegotiation => {
                let (username, password) = match parse_password_auth(&session.payload) {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!("{}: bad auth payload: {}", session.connection_id, err);
                        session.payload = Bytes::from(vec![SOCKS5_AUTH_VERSION, 0x01]);
                        return false;
                    }
                };

                if self.check_credentials(&username, &password) {
                    debug!("{}: authenticated as {}", session.connection_id, username);
                    session.payload = Bytes::from(vec![SOCKS5_AUTH_VERSION, 0x00]);
                    session.step = ProxyStep::Command;
                } else {
                    warn!("{}: auth failed for {}", session.connection_id, username);
                    session.payload = Bytes::from(vec![SOCKS5_AUTH_VERSION, 0x01]);
                }
                false
            }

            ProxyStep::Command => {
                let (command, endpoint) = match parse_command_request(&session.payload) {
                    Ok(parsed) => parsed,
                    Err(CodecError::UnsupportedCommand(byte)) => {
                        warn!("{}: unsupported command {}", session.connection_id, byte);
                        return Self::reject_with(session, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED);
                    }
                    Err(CodecError::MalformedAddress(tag)) => {
                        warn!("{}: unknown address type {}", session.connection_id, tag);
                        return Self::reject_with(
                            session,
                            SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
                        );
                    }
                    Err(err) => {
                        warn!("{}: bad command request: {}", session.connection_id, err);
                        return Self::reject_with(session, SOCKS5_REPLY_GENERAL_FAILURE);
                    }
                };

                let (address, port) = match self.resolve_target(&endpoint) {
                    Ok(target) => target,
                    Err(err) => {
                        warn!(
                            "{}: cannot resolve {}: {}",
                            session.connection_id, endpoint, err
                        );
                        return Self::reject_with(session, SOCKS5_REPLY_HOST_UNREACHABLE);
                    }
                };

                debug!(
                    "{}: {} request for {}",
                    session.connection_id, command, endpoint
                );
                session.command = command;
                session.target_address = address;
                session.target_port = port;
                // Step stays at Command until the answer confirms the
                // connection; the firewall scopes CONNECT as TCP here.
                true
            }

            ProxyStep::Forwarding => {
                if session.command != ProxyCommand::UdpAssociate {
                    return true; // raw TCP bytes pass through untouched
                }

                let payload = session.payload.clone();
                let (endpoint, data) = match parse_udp_envelope(&payload) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!("{}: bad UDP envelope: {}", session.connection_id, err);
                        return false;
                    }
                };
                let (address, port) = match self.resolve_target(&endpoint) {
                    Ok(target) => target,
                    Err(err) => {
                        warn!(
                            "{}: cannot resolve {}: {}",
                            session.connection_id, endpoint, err
                        );
                        return false;
                    }
                };

                session.target_address = address;
                session.target_port = port;
                session.payload = data;
                true
            }
        }
    }

    fn handle_answer_data(&self, session: &mut SessionDescriptor) -> bool {
        match session.step {
            ProxyStep::Command => {
                // Answer to a command request: a non-empty payload carries
                // the driver-supplied reply code, empty means success.
                let reply_code = session
                    .payload
                    .first()
                    .copied()
                    .unwrap_or(SOCKS5_REPLY_SUCCEEDED);
                let bound = Self::bound_endpoint(session);
                session.payload = Bytes::from(build_connect_response(&bound, reply_code));
                if reply_code == SOCKS5_REPLY_SUCCEEDED {
                    session.step = ProxyStep::Forwarding;
                }
                true
            }

            ProxyStep::Forwarding if session.command == ProxyCommand::UdpAssociate => {
                let bound = Self::bound_endpoint(session);
                session.payload = Bytes::from(build_udp_response(&bound, &session.payload));
                true
            }

            // TCP forwarding and handshake stages pass answers through
            _ => true,
        }
    }
}
