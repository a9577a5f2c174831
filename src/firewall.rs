//! Firewall rule-matching engine
//!
//! Evaluates an allow/deny verdict for a target address/port against
//! CIDR-style rule tables keyed by port, transport and plugin scope. Tables
//! are populated once at configuration load and only read afterwards, so
//! lookups are safe to run concurrently from many sessions.
//!
//! Policy: deny rules always win; private/LAN and broadcast/multicast
//! destinations are denied unless explicitly allow-listed; public addresses
//! pass by default. Addresses that are neither 4 nor 16 bytes long are not
//! IP-addressable and pass through unevaluated.

use crate::error::ProxyError;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Transport protocol scoping a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// TCP (CONNECT sessions)
    Tcp,
    /// UDP (everything else)
    Udp,
}

/// Result of a firewall evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Traffic may proceed
    Allowed,
    /// Traffic must be rejected before forwarding
    Denied,
}

/// Composite lookup key for a rule set.
///
/// `port == 0` means "any port" and `plugin_id == 0` means "any plugin".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FirewallKey {
    /// Target port, 0 for wildcard
    pub port: u16,
    /// Transport the rule applies to
    pub transport: Transport,
    /// Owning plugin id, 0 for wildcard
    pub plugin_id: u8,
}

impl FirewallKey {
    /// Create a key for `(port, transport, plugin_id)`.
    pub fn new(port: u16, transport: Transport, plugin_id: u8) -> Self {
        FirewallKey {
            port,
            transport,
            plugin_id,
        }
    }
}

/// One CIDR-style IPv4 block: matches when `(ip & mask) == network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirewallRule {
    /// Network address, host byte order
    pub network: u32,
    /// Netmask, host byte order
    pub mask: u32,
}

impl FirewallRule {
    /// Build a rule from an address and prefix length.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, ProxyError> {
        if prefix_len > 32 {
            return Err(ProxyError::Config(format!(
                "invalid prefix length: /{}",
                prefix_len
            )));
        }
        let mask = if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len)
        };
        Ok(FirewallRule {
            network: u32::from(addr) & mask,
            mask,
        })
    }

    /// Whether `ip` falls inside this block.
    pub fn matches(&self, ip: u32) -> bool {
        (ip & self.mask) == self.network
    }
}

impl FromStr for FirewallRule {
    type Err = ProxyError;

    /// Parse `a.b.c.d/len` CIDR notation; a bare address means `/32`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, len_part) = match s.split_once('/') {
            Some((a, l)) => (a, l),
            None => (s, "32"),
        };
        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|_| ProxyError::Config(format!("invalid CIDR address: {}", s)))?;
        let prefix_len: u8 = len_part
            .parse()
            .map_err(|_| ProxyError::Config(format!("invalid CIDR prefix: {}", s)))?;
        FirewallRule::new(addr, prefix_len)
    }
}

// IPv6 special addresses checked without a table lookup. The link-local
// comparison covers exactly the first two bytes, not the full fe80::/10
// range.
const IPV6_LOOPBACK: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
const IPV6_MULTICAST: [u8; 16] = [0xFF, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
const IPV6_LINK_LOCAL_PREFIX: [u8; 2] = [0xFE, 0x80];

/// Immutable allow/deny rule tables.
///
/// Built once from configuration; the request path only reads it.
#[derive(Debug, Default, Clone)]
pub struct FirewallConfig {
    allow: HashMap<FirewallKey, Vec<FirewallRule>>,
    deny: HashMap<FirewallKey, Vec<FirewallRule>>,
}

impl FirewallConfig {
    /// Create an empty configuration (default-allow for public addresses,
    /// default-deny for restricted ones).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to the allow table under `key`.
    pub fn add_allow(&mut self, key: FirewallKey, rule: FirewallRule) {
        self.allow.entry(key).or_default().push(rule);
    }

    /// Append a rule to the deny table under `key`.
    pub fn add_deny(&mut self, key: FirewallKey, rule: FirewallRule) {
        self.deny.entry(key).or_default().push(rule);
    }

    /// Number of allow rule sets.
    pub fn allow_len(&self) -> usize {
        self.allow.len()
    }

    /// Number of deny rule sets.
    pub fn deny_len(&self) -> usize {
        self.deny.len()
    }

    /// Evaluate a verdict for a target.
    ///
    /// `target_address` must be raw address bytes; lengths other than 4 and
    /// 16 are treated as not IP-addressable and pass through as `Allowed`.
    pub fn evaluate(
        &self,
        target_address: &[u8],
        target_port: u16,
        transport: Transport,
        plugin_id: u8,
    ) -> Verdict {
        match target_address.len() {
            16 => self.evaluate_v6(target_address),
            4 => self.evaluate_v4(target_address, target_port, transport, plugin_id),
            _ => Verdict::Allowed,
        }
    }

    /// IPv6 path: no table lookup, only the special ranges are blocked.
    fn evaluate_v6(&self, addr: &[u8]) -> Verdict {
        if addr == IPV6_LOOPBACK
            || addr == IPV6_MULTICAST
            || addr[..2] == IPV6_LINK_LOCAL_PREFIX
        {
            Verdict::Denied
        } else {
            Verdict::Allowed
        }
    }

    fn evaluate_v4(
        &self,
        addr: &[u8],
        port: u16,
        transport: Transport,
        plugin_id: u8,
    ) -> Verdict {
        let ip = u32::from_be_bytes([addr[0], addr[1], addr[2], addr[3]]);

        // Candidate keys, probed in this exact order with first-found-wins;
        // multiple matching rule sets are never merged.
        let keys = [
            FirewallKey::new(0, transport, 0),
            FirewallKey::new(port, transport, 0),
            FirewallKey::new(0, transport, plugin_id),
            FirewallKey::new(port, transport, plugin_id),
        ];

        // Deny list first: one matching block rejects outright.
        if !self.deny.is_empty() {
            if let Some(rules) = keys.iter().find_map(|k| self.deny.get(k)) {
                if rules.iter().any(|rule| rule.matches(ip)) {
                    return Verdict::Denied;
                }
            }
        }

        // LAN and broadcast/multicast destinations need an explicit allow.
        let ipv4 = Ipv4Addr::from(ip);
        if is_lan(ipv4) || is_broadcast(ipv4) {
            if !self.allow.is_empty() {
                if let Some(rules) = keys.iter().find_map(|k| self.allow.get(k)) {
                    if rules.iter().any(|rule| rule.matches(ip)) {
                        return Verdict::Allowed;
                    }
                }
            }
            return Verdict::Denied;
        }

        Verdict::Allowed
    }
}

/// Whether `ip` is a private, link-local or loopback IPv4 address.
pub fn is_lan(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_link_local() || ip.is_loopback()
}

/// Whether `ip` is a multicast or limited-broadcast IPv4 address.
pub fn is_broadcast(ip: Ipv4Addr) -> bool {
    ip.is_multicast() || ip.is_broadcast()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> [u8; 4] {
        [a, b, c, d]
    }

    fn rule(cidr: &str) -> FirewallRule {
        cidr.parse().unwrap()
    }

    #[test]
    fn test_rule_from_cidr() {
        let r = rule("10.0.0.0/8");
        assert_eq!(r.network, 0x0A00_0000);
        assert_eq!(r.mask, 0xFF00_0000);
        assert!(r.matches(u32::from(Ipv4Addr::new(10, 1, 2, 3))));
        assert!(!r.matches(u32::from(Ipv4Addr::new(11, 1, 2, 3))));
    }

    #[test]
    fn test_rule_bare_address_is_slash_32() {
        let r = rule("127.0.0.1");
        assert!(r.matches(u32::from(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(!r.matches(u32::from(Ipv4Addr::new(127, 0, 0, 2))));
    }

    #[test]
    fn test_rule_zero_prefix_matches_everything() {
        let r = rule("0.0.0.0/0");
        assert!(r.matches(u32::from(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(r.matches(u32::from(Ipv4Addr::new(255, 255, 255, 255))));
    }

    #[test]
    fn test_rule_parse_errors() {
        assert!("10.0.0.0/33".parse::<FirewallRule>().is_err());
        assert!("not-an-ip/8".parse::<FirewallRule>().is_err());
        assert!("10.0.0.0/x".parse::<FirewallRule>().is_err());
    }

    #[test]
    fn test_network_is_masked_on_construction() {
        let r = rule("10.1.2.3/8");
        assert_eq!(r.network, 0x0A00_0000);
    }

    #[test]
    fn test_public_address_empty_tables_allowed() {
        let fw = FirewallConfig::new();
        let verdict = fw.evaluate(&v4(8, 8, 8, 8), 53, Transport::Udp, 1);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn test_private_address_empty_tables_denied() {
        let fw = FirewallConfig::new();
        for addr in [
            v4(10, 0, 0, 1),
            v4(172, 16, 0, 1),
            v4(192, 168, 1, 1),
            v4(169, 254, 0, 1),
            v4(127, 0, 0, 1), // loopback is LAN-classified
        ] {
            assert_eq!(
                fw.evaluate(&addr, 80, Transport::Tcp, 1),
                Verdict::Denied,
                "expected deny for {:?}",
                addr
            );
        }
    }

    #[test]
    fn test_broadcast_and_multicast_denied_by_default() {
        let fw = FirewallConfig::new();
        assert_eq!(
            fw.evaluate(&v4(255, 255, 255, 255), 67, Transport::Udp, 1),
            Verdict::Denied
        );
        assert_eq!(
            fw.evaluate(&v4(224, 0, 0, 251), 5353, Transport::Udp, 1),
            Verdict::Denied
        );
    }

    #[test]
    fn test_lan_address_with_matching_allow_rule() {
        let mut fw = FirewallConfig::new();
        fw.add_allow(FirewallKey::new(80, Transport::Tcp, 1), rule("127.0.0.1/32"));

        assert_eq!(
            fw.evaluate(&v4(127, 0, 0, 1), 80, Transport::Tcp, 1),
            Verdict::Allowed
        );
        // Different port: the allow key does not apply
        assert_eq!(
            fw.evaluate(&v4(127, 0, 0, 1), 81, Transport::Tcp, 1),
            Verdict::Denied
        );
        // Different transport
        assert_eq!(
            fw.evaluate(&v4(127, 0, 0, 1), 80, Transport::Udp, 1),
            Verdict::Denied
        );
    }

    #[test]
    fn test_deny_rule_matches_public_address() {
        let mut fw = FirewallConfig::new();
        fw.add_deny(FirewallKey::new(0, Transport::Tcp, 0), rule("8.8.8.0/24"));

        assert_eq!(
            fw.evaluate(&v4(8, 8, 8, 8), 443, Transport::Tcp, 2),
            Verdict::Denied
        );
        assert_eq!(
            fw.evaluate(&v4(8, 8, 4, 4), 443, Transport::Tcp, 2),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_deny_takes_precedence_over_allow() {
        let mut fw = FirewallConfig::new();
        let key = FirewallKey::new(0, Transport::Tcp, 0);
        fw.add_allow(key, rule("192.168.0.0/16"));
        fw.add_deny(key, rule("192.168.1.0/24"));

        assert_eq!(
            fw.evaluate(&v4(192, 168, 1, 10), 80, Transport::Tcp, 1),
            Verdict::Denied
        );
        // Outside the denied block the allow list still applies
        assert_eq!(
            fw.evaluate(&v4(192, 168, 2, 10), 80, Transport::Tcp, 1),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_key_lookup_order_first_found_wins() {
        // The fully wildcarded key is probed first. If it holds a rule set
        // that does not match, more specific sets are never consulted.
        let mut fw = FirewallConfig::new();
        fw.add_deny(FirewallKey::new(0, Transport::Tcp, 0), rule("1.2.3.4/32"));
        fw.add_deny(FirewallKey::new(443, Transport::Tcp, 7), rule("8.8.8.8/32"));

        assert_eq!(
            fw.evaluate(&v4(8, 8, 8, 8), 443, Transport::Tcp, 7),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_plugin_scoped_allow_found_when_no_wildcard_set() {
        let mut fw = FirewallConfig::new();
        fw.add_allow(
            FirewallKey::new(0, Transport::Udp, 3),
            rule("192.168.0.0/16"),
        );

        assert_eq!(
            fw.evaluate(&v4(192, 168, 5, 5), 1234, Transport::Udp, 3),
            Verdict::Allowed
        );
        // Other plugins find no rule set and stay denied
        assert_eq!(
            fw.evaluate(&v4(192, 168, 5, 5), 1234, Transport::Udp, 4),
            Verdict::Denied
        );
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let mut fw = FirewallConfig::new();
        fw.add_deny(FirewallKey::new(0, Transport::Tcp, 0), rule("8.0.0.0/8"));
        fw.add_allow(FirewallKey::new(0, Transport::Tcp, 0), rule("10.0.0.0/8"));

        for _ in 0..10 {
            assert_eq!(
                fw.evaluate(&v4(8, 8, 8, 8), 80, Transport::Tcp, 1),
                Verdict::Denied
            );
            assert_eq!(
                fw.evaluate(&v4(10, 0, 0, 1), 80, Transport::Tcp, 1),
                Verdict::Allowed
            );
            assert_eq!(
                fw.evaluate(&v4(1, 1, 1, 1), 80, Transport::Tcp, 1),
                Verdict::Allowed
            );
        }
    }

    #[test]
    fn test_ipv6_special_ranges() {
        let fw = FirewallConfig::new();

        assert_eq!(fw.evaluate(&IPV6_LOOPBACK, 80, Transport::Tcp, 1), Verdict::Denied);
        assert_eq!(fw.evaluate(&IPV6_MULTICAST, 80, Transport::Udp, 1), Verdict::Denied);

        // Link-local: only the first two bytes are compared
        let mut link_local = [0u8; 16];
        link_local[0] = 0xFE;
        link_local[1] = 0x80;
        link_local[15] = 0x01;
        assert_eq!(fw.evaluate(&link_local, 80, Transport::Tcp, 1), Verdict::Denied);

        // fe81:: falls outside the literal two-byte comparison
        let mut outside = link_local;
        outside[1] = 0x81;
        assert_eq!(fw.evaluate(&outside, 80, Transport::Tcp, 1), Verdict::Allowed);

        // Global unicast passes
        let mut global = [0u8; 16];
        global[0] = 0x20;
        global[1] = 0x01;
        assert_eq!(fw.evaluate(&global, 80, Transport::Tcp, 1), Verdict::Allowed);
    }

    #[test]
    fn test_ipv6_ignores_tables() {
        // Even a universal deny rule has no effect on the IPv6 path.
        let mut fw = FirewallConfig::new();
        fw.add_deny(FirewallKey::new(0, Transport::Tcp, 0), rule("0.0.0.0/0"));

        let mut global = [0u8; 16];
        global[0] = 0x20;
        assert_eq!(fw.evaluate(&global, 80, Transport::Tcp, 1), Verdict::Allowed);
    }

    #[test]
    fn test_non_ip_lengths_pass_through() {
        let mut fw = FirewallConfig::new();
        fw.add_deny(FirewallKey::new(0, Transport::Tcp, 0), rule("0.0.0.0/0"));

        assert_eq!(fw.evaluate(&[], 80, Transport::Tcp, 1), Verdict::Allowed);
        assert_eq!(fw.evaluate(&[1, 2, 3], 80, Transport::Tcp, 1), Verdict::Allowed);
        assert_eq!(
            fw.evaluate(&[0u8; 10], 80, Transport::Tcp, 1),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_is_lan_and_is_broadcast() {
        assert!(is_lan(Ipv4Addr::new(10, 1, 1, 1)));
        assert!(is_lan(Ipv4Addr::new(172, 31, 0, 1)));
        assert!(is_lan(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(!is_lan(Ipv4Addr::new(172, 32, 0, 1)));
        assert!(!is_lan(Ipv4Addr::new(8, 8, 8, 8)));

        assert!(is_broadcast(Ipv4Addr::new(239, 255, 255, 250)));
        assert!(is_broadcast(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(!is_broadcast(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
