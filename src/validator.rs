//! Session validators and the validator chain
//!
//! Validators are independent pass/fail checks over a session descriptor.
//! The chain runs them in registration order with AND semantics, stopping
//! at the first failure. It is built once at startup and read concurrently
//! by many sessions afterwards.

use crate::firewall::{FirewallConfig, Transport, Verdict};
use crate::plugin::PluginRegistry;
use crate::session::{ConnectionId, ProxyCommand, ProxyStep, SessionDescriptor};
use std::sync::Arc;
use tracing::debug;

/// A single pass/fail check over a session.
pub trait SessionValidator: Send + Sync {
    /// Whether the session may proceed.
    fn validate(&self, session: &SessionDescriptor) -> bool;
}

/// External access-control boundary: decides whether a connection holds a
/// given capability.
pub trait ServiceAccess: Send + Sync {
    /// Whether `connection_id` has been granted `capability`.
    fn validate(&self, connection_id: ConnectionId, capability: u32) -> bool;
}

/// Service access that grants everything; useful when no external
/// access-control component is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAccess;

impl ServiceAccess for AllowAllAccess {
    fn validate(&self, _connection_id: ConnectionId, _capability: u32) -> bool {
        true
    }
}

/// Ordered AND-composition of validators with short-circuit.
///
/// An empty chain validates every session.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn SessionValidator>>,
}

impl ValidatorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from an ordered list of validators.
    pub fn from_validators(validators: Vec<Arc<dyn SessionValidator>>) -> Self {
        ValidatorChain { validators }
    }

    /// Append a validator; evaluation order is registration order.
    pub fn push(&mut self, validator: Arc<dyn SessionValidator>) {
        self.validators.push(validator);
    }

    /// Number of validators in the chain.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the chain holds no validators.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Walk the chain in order; the first `false` wins and later validators
    /// are not invoked.
    pub fn validate(&self, session: &SessionDescriptor) -> bool {
        for (index, validator) in self.validators.iter().enumerate() {
            if !validator.validate(session) {
                debug!(
                    "session {} rejected by validator {}",
                    session.connection_id, index
                );
                return false;
            }
        }
        true
    }
}

/// The access-and-firewall link of the chain.
///
/// Passes when the owning plugin either allows direct connects or the
/// external service-access check grants its capability, and the firewall
/// does not deny the target.
pub struct AccessFirewallValidator {
    registry: Arc<PluginRegistry>,
    firewall: Arc<FirewallConfig>,
    service_access: Arc<dyn ServiceAccess>,
}

impl AccessFirewallValidator {
    /// Wire the validator to its collaborators.
    pub fn new(
        registry: Arc<PluginRegistry>,
        firewall: Arc<FirewallConfig>,
        service_access: Arc<dyn ServiceAccess>,
    ) -> Self {
        AccessFirewallValidator {
            registry,
            firewall,
            service_access,
        }
    }

    /// TCP only for an established CONNECT command; every other step and
    /// command is scoped as UDP.
    fn transport_for(session: &SessionDescriptor) -> Transport {
        if session.step == ProxyStep::Command && session.command == ProxyCommand::Connect {
            Transport::Tcp
        } else {
            Transport::Udp
        }
    }
}

impl SessionValidator for AccessFirewallValidator {
    fn validate(&self, session: &SessionDescriptor) -> bool {
        let plugin = match self.registry.resolve(session.plugin_id) {
            Ok(plugin) => plugin,
            Err(_) => {
                debug!(
                    "session {}: no plugin {} registered",
                    session.connection_id, session.plugin_id
                );
                return false;
            }
        };

        let access_ok = plugin.connect_enabled()
            || self
                .service_access
                .validate(session.connection_id, plugin.access_capability());
        if !access_ok {
            return false;
        }

        let verdict = self.firewall.evaluate(
            &session.target_address,
            session.target_port,
            Self::transport_for(session),
            session.plugin_id,
        );
        verdict != Verdict::Denied
    }
}
