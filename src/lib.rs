//! # Proxyfront - Pluggable Proxy Front-End
//!
//! Proxyfront is the protocol-and-policy core of a proxy: a single listening
//! surface (owned by the caller) accepts connections speaking different wire
//! protocols, and this crate decides what happens to each session. It
//! bundles three tightly coupled pieces:
//!
//! - **SOCKS5 codec**: handshake, command and UDP-envelope parsing plus
//!   response framing, over plain in-memory buffers
//! - **Firewall engine**: CIDR allow/deny verdicts keyed by port, transport
//!   and plugin scope
//! - **Plugin registry + validator chain**: protocol plugins registered
//!   under one-byte ids, composed with access checks into a single
//!   pass/fail decision per session
//!
//! ## Usage
//!
//! ```rust
//! use proxyfront::frontend::ProxyFrontend;
//! use proxyfront::session::{ConnectionId, SessionDescriptor};
//! use proxyfront::socks5::{Socks5Config, Socks5Plugin, SOCKS5_PLUGIN_ID};
//! use std::sync::Arc;
//!
//! let frontend = ProxyFrontend::builder()
//!     .register_plugin(Arc::new(Socks5Plugin::new(Socks5Config::default())))
//!     .build();
//!
//! let mut session = SessionDescriptor::new(SOCKS5_PLUGIN_ID, ConnectionId(1));
//! session.payload = bytes::Bytes::from_static(&[0x05, 0x01, 0x00]);
//! let decision = frontend.handle_request(&mut session).unwrap();
//! assert_eq!(decision, proxyfront::frontend::Decision::Reply);
//! ```
//!
//! ## Architecture
//!
//! Transport I/O stays outside: the caller reads bytes, hands them to
//! [`frontend::ProxyFrontend::handle_request`] /
//! [`frontend::ProxyFrontend::handle_answer`], and acts on the returned
//! [`frontend::Decision`]. Nothing in this crate blocks or suspends; every
//! operation is a synchronous transform over buffers and read-only tables,
//! safe to run concurrently across sessions.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod firewall;
pub mod frontend;
pub mod plugin;
pub mod session;
pub mod socks5;
pub mod validator;

// Re-export commonly used items
pub use config::{load_config, parse_config, Config};
pub use error::{CodecError, ProxyError};
pub use firewall::{FirewallConfig, FirewallKey, FirewallRule, Transport, Verdict};
pub use frontend::{Decision, ProxyFrontend, ProxyFrontendBuilder};
pub use plugin::{PluginRegistry, ProxyPlugin, ValidateResult};
pub use session::{ConnectionId, ProxyCommand, ProxyStep, SessionDescriptor};
pub use validator::{ServiceAccess, SessionValidator, ValidatorChain};

/// Version of the proxyfront library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the library
pub const NAME: &str = env!("CARGO_PKG_NAME");
