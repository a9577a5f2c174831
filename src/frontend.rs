//! Proxy front-end: plugins, firewall and validators composed into one
//! pass/fail decision per session message.
//!
//! The front-end owns the plugin registry and validator chain. It is built
//! once at startup and read-only afterwards; the transport layer calls
//! [`ProxyFrontend::handle_request`] for bytes arriving from the originator
//! and [`ProxyFrontend::handle_answer`] for bytes arriving from the target.

use crate::error::ProxyError;
use crate::firewall::FirewallConfig;
use crate::plugin::{PluginRegistry, ProxyPlugin, ValidateResult};
use crate::session::SessionDescriptor;
use crate::validator::{
    AccessFirewallValidator, AllowAllAccess, ServiceAccess, SessionValidator, ValidatorChain,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the transport layer should do with the session payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward the payload to the target
    Forward,
    /// Send the payload back to the originator
    Reply,
    /// Wait for more bytes and retry with a longer payload
    NeedMoreData,
    /// Reject the session; nothing is forwarded
    Rejected,
}

/// The assembled proxy front-end.
pub struct ProxyFrontend {
    registry: Arc<PluginRegistry>,
    chain: ValidatorChain,
}

impl ProxyFrontend {
    /// Start building a front-end.
    pub fn builder() -> ProxyFrontendBuilder {
        ProxyFrontendBuilder::new()
    }

    /// The plugin registry backing this front-end.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Process payload bytes arriving from the originator.
    ///
    /// Resolves the owning plugin, runs its integrity check, lets it parse
    /// and preprocess the request, then evaluates the validator chain. A
    /// failing chain rejects the session before anything is forwarded.
    pub fn handle_request(
        &self,
        session: &mut SessionDescriptor,
    ) -> Result<Decision, ProxyError> {
        let plugin = self.registry.resolve(session.plugin_id)?;

        match plugin.validate_data(session) {
            ValidateResult::Incomplete => return Ok(Decision::NeedMoreData),
            ValidateResult::Error => {
                warn!("{}: payload failed integrity check", session.connection_id);
                return Ok(Decision::Rejected);
            }
            ValidateResult::Success => {}
        }

        let wants_forward = plugin.handle_request_data(session);

        if !self.chain.validate(session) {
            debug!("{}: rejected by validator chain", session.connection_id);
            return Ok(Decision::Rejected);
        }

        Ok(if wants_forward {
            Decision::Forward
        } else {
            Decision::Reply
        })
    }

    /// Process payload bytes arriving from the target.
    pub fn handle_answer(
        &self,
        session: &mut SessionDescriptor,
    ) -> Result<Decision, ProxyError> {
        let plugin = self.registry.resolve(session.plugin_id)?;

        Ok(if plugin.handle_answer_data(session) {
            Decision::Reply
        } else {
            Decision::Rejected
        })
    }
}

/// Builder assembling registry, firewall and validators at startup.
pub struct ProxyFrontendBuilder {
    registry: Arc<PluginRegistry>,
    firewall: FirewallConfig,
    service_access: Arc<dyn ServiceAccess>,
    extra_validators: Vec<Arc<dyn SessionValidator>>,
}

impl Default for ProxyFrontendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyFrontendBuilder {
    /// Create a builder with an empty firewall and allow-all service access.
    pub fn new() -> Self {
        ProxyFrontendBuilder {
            registry: Arc::new(PluginRegistry::new()),
            firewall: FirewallConfig::new(),
            service_access: Arc::new(AllowAllAccess),
            extra_validators: Vec::new(),
        }
    }

    /// Register a protocol plugin. A duplicate id is logged and dropped;
    /// the first registration stays in effect.
    pub fn register_plugin(self, plugin: Arc<dyn ProxyPlugin>) -> Self {
        if let Err(err) = self.registry.register(plugin) {
            warn!("plugin registration dropped: {}", err);
        }
        self
    }

    /// Install the firewall rule tables.
    pub fn firewall(mut self, firewall: FirewallConfig) -> Self {
        self.firewall = firewall;
        self
    }

    /// Wire in the external service-access component.
    pub fn service_access(mut self, access: Arc<dyn ServiceAccess>) -> Self {
        self.service_access = access;
        self
    }

    /// Append a validator after the access-and-firewall link.
    pub fn push_validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.extra_validators.push(validator);
        self
    }

    /// Assemble the front-end. The validator chain starts with the
    /// access-and-firewall link, followed by extra validators in the order
    /// they were pushed.
    pub fn build(self) -> ProxyFrontend {
        let mut chain = ValidatorChain::new();
        chain.push(Arc::new(AccessFirewallValidator::new(
            Arc::clone(&self.registry),
            Arc::new(self.firewall),
            self.service_access,
        )));
        for validator in self.extra_validators {
            chain.push(validator);
        }

        ProxyFrontend {
            registry: self.registry,
            chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::{FirewallKey, FirewallRule, Transport};
    use crate::session::{ConnectionId, ProxyStep};
    use crate::socks5::{Socks5Config, Socks5Plugin, SOCKS5_PLUGIN_ID};
    use bytes::Bytes;

    fn frontend_with(firewall: FirewallConfig) -> ProxyFrontend {
        ProxyFrontend::builder()
            .register_plugin(Arc::new(Socks5Plugin::new(Socks5Config::default())))
            .firewall(firewall)
            .build()
    }

    fn new_session() -> SessionDescriptor {
        SessionDescriptor::new(SOCKS5_PLUGIN_ID, ConnectionId(1))
    }

    #[test]
    fn test_unknown_plugin_id_is_an_error() {
        let frontend = frontend_with(FirewallConfig::new());
        let mut session = SessionDescriptor::new(200, ConnectionId(1));
        session.payload = Bytes::from_static(&[0x05, 0x01, 0x00]);

        let err = frontend.handle_request(&mut session).unwrap_err();
        assert!(matches!(err, ProxyError::PluginNotFound(200)));
    }

    #[test]
    fn test_truncated_payload_needs_more_data() {
        let frontend = frontend_with(FirewallConfig::new());
        let mut session = new_session();
        session.payload = Bytes::from_static(&[0x05]);

        let decision = frontend.handle_request(&mut session).unwrap();
        assert_eq!(decision, Decision::NeedMoreData);
        // Payload untouched; the caller appends bytes and retries
        assert_eq!(session.payload.as_ref(), &[0x05]);
    }

    #[test]
    fn test_handshake_reply_goes_to_originator() {
        let frontend = frontend_with(FirewallConfig::new());
        let mut session = new_session();
        session.payload = Bytes::from_static(&[0x05, 0x01, 0x00]);

        let decision = frontend.handle_request(&mut session).unwrap();
        assert_eq!(decision, Decision::Reply);
        assert_eq!(session.payload.as_ref(), &[0x05, 0x00]);
        assert_eq!(session.step, ProxyStep::Command);
    }

    #[test]
    fn test_connect_to_loopback_rejected_with_empty_tables() {
        let frontend = frontend_with(FirewallConfig::new());
        let mut session = new_session();
        session.step = ProxyStep::Command;
        session.payload =
            Bytes::from_static(&[0x05, 0x01, 0x00, 0x01, 0x7F, 0x00, 0x00, 0x01, 0x00, 0x50]);

        let decision = frontend.handle_request(&mut session).unwrap();
        assert_eq!(decision, Decision::Rejected);
    }

    #[test]
    fn test_connect_to_loopback_allowed_with_allow_rule() {
        let mut firewall = FirewallConfig::new();
        firewall.add_allow(
            FirewallKey::new(80, Transport::Tcp, SOCKS5_PLUGIN_ID),
            "127.0.0.1/32".parse::<FirewallRule>().unwrap(),
        );
        let frontend = frontend_with(firewall);

        let mut session = new_session();
        session.step = ProxyStep::Command;
        session.payload =
            Bytes::from_static(&[0x05, 0x01, 0x00, 0x01, 0x7F, 0x00, 0x00, 0x01, 0x00, 0x50]);

        let decision = frontend.handle_request(&mut session).unwrap();
        assert_eq!(decision, Decision::Forward);
        assert_eq!(session.target_address.as_ref(), &[127, 0, 0, 1]);
        assert_eq!(session.target_port, 80);
    }

    #[test]
    fn test_extra_validator_runs_after_access_link() {
        struct RejectEverything;
        impl SessionValidator for RejectEverything {
            fn validate(&self, _session: &SessionDescriptor) -> bool {
                false
            }
        }

        let frontend = ProxyFrontend::builder()
            .register_plugin(Arc::new(Socks5Plugin::new(Socks5Config::default())))
            .push_validator(Arc::new(RejectEverything))
            .build();

        let mut session = new_session();
        session.step = ProxyStep::Command;
        session.payload =
            Bytes::from_static(&[0x05, 0x01, 0x00, 0x01, 8, 8, 8, 8, 0x01, 0xBB]);

        let decision = frontend.handle_request(&mut session).unwrap();
        assert_eq!(decision, Decision::Rejected);
    }

    #[test]
    fn test_duplicate_plugin_registration_keeps_first() {
        let frontend = ProxyFrontend::builder()
            .register_plugin(Arc::new(Socks5Plugin::new(Socks5Config::default())))
            .register_plugin(Arc::new(Socks5Plugin::new(Socks5Config {
                connect_enabled: false,
                ..Socks5Config::default()
            })))
            .build();

        assert_eq!(frontend.registry().len(), 1);
        let plugin = frontend.registry().resolve(SOCKS5_PLUGIN_ID).unwrap();
        assert!(plugin.connect_enabled());
    }

    #[test]
    fn test_answer_path_builds_connect_reply() {
        let frontend = frontend_with(FirewallConfig::new());
        let mut session = new_session();
        session.step = ProxyStep::Command;
        session.target_address = Bytes::copy_from_slice(&[8, 8, 8, 8]);
        session.target_port = 443;
        session.payload = Bytes::new();

        let decision = frontend.handle_answer(&mut session).unwrap();
        assert_eq!(decision, Decision::Reply);
        assert_eq!(session.step, ProxyStep::Forwarding);
        assert_eq!(session.payload[0], 0x05);
        assert_eq!(session.payload[1], 0x00);
    }
}
