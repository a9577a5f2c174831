//! Test utilities shared across integration tests.

use bytes::Bytes;
use proxyfront::session::{ConnectionId, ProxyCommand, ProxyStep, SessionDescriptor};
use proxyfront::socks5::SOCKS5_PLUGIN_ID;

/// Builder for session descriptors in arbitrary states.
pub struct SessionBuilder {
    plugin_id: u8,
    step: ProxyStep,
    command: ProxyCommand,
    payload: Vec<u8>,
    target: Option<(Vec<u8>, u16)>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        SessionBuilder {
            plugin_id: SOCKS5_PLUGIN_ID,
            step: ProxyStep::Auth,
            command: ProxyCommand::Connect,
            payload: Vec::new(),
            target: None,
        }
    }
}

#[allow(dead_code)]
impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin_id(mut self, id: u8) -> Self {
        self.plugin_id = id;
        self
    }

    pub fn step(mut self, step: ProxyStep) -> Self {
        self.step = step;
        self
    }

    pub fn command(mut self, command: ProxyCommand) -> Self {
        self.command = command;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn target(mut self, address: &[u8], port: u16) -> Self {
        self.target = Some((address.to_vec(), port));
        self
    }

    pub fn build(self) -> SessionDescriptor {
        let mut session = SessionDescriptor::new(self.plugin_id, ConnectionId(99));
        session.step = self.step;
        session.command = self.command;
        session.payload = Bytes::from(self.payload);
        if let Some((address, port)) = self.target {
            session.target_address = Bytes::from(address);
            session.target_port = port;
        }
        session
    }
}

/// A SOCKS5 CONNECT request to an IPv4 target.
pub fn connect_request(ip: [u8; 4], port: u16) -> Vec<u8> {
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&ip);
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// A SOCKS5 UDP ASSOCIATE request bound to 0.0.0.0:0.
pub fn udp_associate_request() -> Vec<u8> {
    vec![0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
}

/// A SOCKS5 UDP envelope carrying `payload` for an IPv4 target.
pub fn udp_envelope(ip: [u8; 4], port: u16, payload: &[u8]) -> Vec<u8> {
    let mut envelope = vec![0x00, 0x00, 0x00, 0x01];
    envelope.extend_from_slice(&ip);
    envelope.extend_from_slice(&port.to_be_bytes());
    envelope.extend_from_slice(payload);
    envelope
}
