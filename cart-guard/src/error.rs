//! Error types for Cart Guard
//!
//! Three families of failure exist:
//! - [`TransportError`]: the cart service could not be read or written
//! - [`MalformedRule`]: a line carries rule metadata that does not parse
//! - [`GuardError::PartialApply`]: some planned mutations did not land
//!
//! None of them ever reaches the code that fired the trigger. The cycle logs
//! them and carries on; the next trigger re-evaluates from scratch.

use thiserror::Error;

use crate::model::LineIndex;

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Result type for cart service calls
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while talking to the cart service
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request failed before a response was received
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Cart service answered with a non-success status
    #[error("Cart service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not a valid cart payload
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Write targeted a line that does not exist
    #[error("Line {line} out of range (cart has {len} lines)")]
    LineOutOfRange { line: LineIndex, len: usize },

    /// Service cannot be reached at all
    #[error("Cart service unavailable: {0}")]
    Unavailable(String),
}

/// A rule property that could not be parsed.
///
/// Only ever logged: a malformed rule is treated as an absent rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed rule {key}={value:?}: {reason}")]
pub struct MalformedRule {
    /// Property key the value was read from
    pub key: String,

    /// Raw property value
    pub value: String,

    /// Why it was rejected
    pub reason: String,
}

impl MalformedRule {
    pub fn new(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in the guard
#[derive(Error, Debug)]
pub enum GuardError {
    /// Cart service failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Some mutations of a plan failed to apply
    #[error("Partial apply: {applied} applied, {failed} failed")]
    PartialApply { applied: usize, failed: usize },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
