//! Protocol plugin contract and registry
//!
//! A plugin owns one wire protocol (SOCKS5 being the concrete one shipped
//! here) and is registered under a one-byte identifier. The registry is
//! owned by the front-end instance, filled at startup and resolved on every
//! session.

use crate::error::ProxyError;
use crate::session::SessionDescriptor;
use std::collections::HashMap;
use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, RwLock};
use tracing::error;

/// Buffer size hint a plugin advertises for its sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BufferSize {
    Kb1,
    Kb2,
    Kb4,
    Kb8,
    Kb16,
    Kb32,
    Kb64,
    Kb128,
    Kb256,
    Kb512,
    Kb1024,
}

impl BufferSize {
    /// Hint in bytes.
    pub fn bytes(self) -> usize {
        match self {
            BufferSize::Kb1 => 1 << 10,
            BufferSize::Kb2 => 2 << 10,
            BufferSize::Kb4 => 4 << 10,
            BufferSize::Kb8 => 8 << 10,
            BufferSize::Kb16 => 16 << 10,
            BufferSize::Kb32 => 32 << 10,
            BufferSize::Kb64 => 64 << 10,
            BufferSize::Kb128 => 128 << 10,
            BufferSize::Kb256 => 256 << 10,
            BufferSize::Kb512 => 512 << 10,
            BufferSize::Kb1024 => 1024 << 10,
        }
    }
}

/// Outcome of a plugin's integrity check on the current payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateResult {
    /// Payload is complete and well-formed for the current step
    Success,
    /// More bytes are needed; retry with a longer payload
    Incomplete,
    /// Payload can never become valid; terminate the session
    Error,
}

/// Capability contract every protocol plugin implements.
///
/// `handle_request_data` and `handle_answer_data` are preprocessing hooks:
/// their boolean return states whether the (possibly rewritten) payload
/// should be forwarded to the target / back to the originator. Lifecycle
/// hooks default to no-ops.
pub trait ProxyPlugin: Send + Sync + Debug {
    /// One-byte identifier this plugin registers under.
    fn id(&self) -> u8;

    /// Whether sessions may connect without passing the service-access check.
    fn connect_enabled(&self) -> bool;

    /// Buffer size hint for this plugin's sessions.
    fn buffer_size(&self) -> BufferSize {
        BufferSize::Kb8
    }

    /// Address UDP broadcast traffic binds to.
    fn broadcast_bind(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    /// Capability token checked by the external service-access validator.
    fn access_capability(&self) -> u32;

    /// Integrity check on the session's current payload.
    fn validate_data(&self, session: &SessionDescriptor) -> ValidateResult;

    /// Preprocess request data; `true` means forward the payload to the
    /// target, `false` means the payload (now a reply) goes back to the
    /// originator instead.
    fn handle_request_data(&self, session: &mut SessionDescriptor) -> bool;

    /// Preprocess answer data; `true` means send the payload to the
    /// originator.
    fn handle_answer_data(&self, session: &mut SessionDescriptor) -> bool;

    /// Called when a listener for this plugin starts.
    fn on_started(&self, _port: u16) {}

    /// Called when a listener for this plugin stops.
    fn on_stopped(&self, _port: u16) {}
}

/// Registry mapping plugin ids to registered plugin instances.
///
/// Registration happens at startup, lookups happen on every session; both
/// are safe under concurrent access. Duplicate ids are rejected: the first
/// registration wins and the attempt is reported, never silently
/// overwritten.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<u8, Arc<dyn ProxyPlugin>>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its id.
    ///
    /// A duplicate id is logged and dropped; the error return lets callers
    /// observe the conflict but is not fatal.
    pub fn register(&self, plugin: Arc<dyn ProxyPlugin>) -> Result<(), ProxyError> {
        let id = plugin.id();
        let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
        if plugins.contains_key(&id) {
            error!("plugin {} ({:?}) already exists", id, plugin);
            return Err(ProxyError::PluginAlreadyRegistered(id));
        }
        plugins.insert(id, plugin);
        Ok(())
    }

    /// Look up the plugin registered under `id`.
    pub fn resolve(&self, id: u8) -> Result<Arc<dyn ProxyPlugin>, ProxyError> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(ProxyError::PluginNotFound(id))
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
