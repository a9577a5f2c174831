//! Error types for proxyfront
//!
//! This module defines all custom error types used throughout the library.

use thiserror::Error;

/// Main error type for proxy front-end operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Wire codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// No plugin registered under the requested id
    #[error("No plugin registered for id {0}")]
    PluginNotFound(u8),

    /// A plugin with the same id is already registered
    #[error("Plugin id {0} is already registered")]
    PluginAlreadyRegistered(u8),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors produced while parsing or building protocol messages.
///
/// Only `Truncated` is recoverable: the caller should wait for more bytes
/// and retry the same parse. Every other kind terminates the session.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Buffer shorter than a field demands
    #[error("Truncated message: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes the current field requires
        needed: usize,
        /// Bytes actually available
        have: usize,
    },

    /// Address-type tag not recognized
    #[error("Malformed address: unknown address type {0}")]
    MalformedAddress(u8),

    /// Command byte not CONNECT/BIND/UDP ASSOCIATE
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(u8),

    /// The external resolver could not resolve a domain-typed endpoint
    #[error("Domain resolution failed: {0}")]
    DomainResolutionFailed(String),
}

impl CodecError {
    /// Whether the caller may retry this parse once more bytes arrive.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Truncated { .. })
    }
}

/// Fail with `Truncated` unless the buffer holds at least `needed` bytes.
pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        Err(CodecError::Truncated {
            needed,
            have: buf.len(),
        })
    } else {
        Ok(())
    }
}
