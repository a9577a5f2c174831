//! Configuration loading
//!
//! Firewall rule tables and SOCKS5 plugin settings come from a TOML file.
//! Rules are written as CIDR strings grouped by `(port, transport, plugin)`
//! key fields, with `0` meaning "any port" / "any plugin", and compile to
//! the immutable in-memory tables the engine reads.

use crate::error::ProxyError;
use crate::firewall::{FirewallConfig, FirewallKey, FirewallRule, Transport};
use crate::socks5::Socks5Config;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Firewall allow/deny rule tables
    #[serde(default)]
    pub firewall: FirewallSection,
    /// SOCKS5 plugin settings
    #[serde(default)]
    pub socks5: Socks5Config,
}

/// The two firewall rule lists.
#[derive(Debug, Default, Deserialize)]
pub struct FirewallSection {
    /// Allow-list entries
    #[serde(default)]
    pub allow: Vec<FirewallEntry>,
    /// Deny-list entries
    #[serde(default)]
    pub deny: Vec<FirewallEntry>,
}

/// One keyed group of CIDR rules.
#[derive(Debug, Deserialize)]
pub struct FirewallEntry {
    /// Target port, 0 for any
    #[serde(default)]
    pub port: u16,
    /// Transport the rules apply to
    pub transport: Transport,
    /// Plugin id, 0 for any
    #[serde(default)]
    pub plugin: u8,
    /// CIDR blocks, e.g. `"10.0.0.0/8"` or a bare address
    pub rules: Vec<String>,
}

impl FirewallEntry {
    fn key(&self) -> FirewallKey {
        FirewallKey::new(self.port, self.transport, self.plugin)
    }
}

impl FirewallSection {
    /// Compile the textual rules into the engine's lookup tables.
    pub fn compile(&self) -> Result<FirewallConfig, ProxyError> {
        let mut firewall = FirewallConfig::new();
        for entry in &self.allow {
            for cidr in &entry.rules {
                firewall.add_allow(entry.key(), cidr.parse::<FirewallRule>()?);
            }
        }
        for entry in &self.deny {
            for cidr in &entry.rules {
                firewall.add_deny(entry.key(), cidr.parse::<FirewallRule>()?);
            }
        }
        Ok(firewall)
    }
}

/// Load configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}
