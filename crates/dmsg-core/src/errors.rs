//! Unified error type for the dmsg span subsystem
//!
//! The subsystem has no user-facing error channel. Errors here are either
//! configuration problems caught before the service starts, or messages the
//! transport delivered that do not match local state.

use crate::identifiers::TransactionId;
use serde::{Deserialize, Serialize};

/// Unified error type for all dmsg operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DmsgError {
    /// Referenced record does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Message is inconsistent with the local transaction state
    #[error("Protocol error on {tx}: {message}")]
    Protocol {
        /// Transaction the message arrived on
        tx: TransactionId,
        /// Error message describing the violation
        message: String,
    },

    /// Configuration rejected by validation or parsing
    #[error("Config error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl DmsgError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a protocol error bound to a transaction
    pub fn protocol(tx: TransactionId, message: impl Into<String>) -> Self {
        Self::Protocol {
            tx,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Standard Result type for dmsg operations
pub type Result<T> = std::result::Result<T, DmsgError>;

impl From<toml::de::Error> for DmsgError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}
