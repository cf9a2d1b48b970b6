//! Error types for store operations.

use docbus_bus::{BusError, CODE_CANCELLED, CODE_NOT_FOUND};
use std::time::Duration;
use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by dispatch and listener operations.
///
/// `NotFound` is distinguished from generic failures so callers can branch on
/// absence versus transient error. No variant is ever retried by this layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No reply arrived within the timeout bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store holds no document for the targeted id.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A reply payload did not match the expected shape.
    #[error("failed to decode reply: {0}")]
    Decode(String),

    /// A request payload could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialization(String),

    /// The backing worker reported an internal failure.
    #[error("backing store failure: [{code}] {message}")]
    Backend {
        /// Machine-readable failure code.
        code: String,
        /// Human-readable failure message.
        message: String,
    },

    /// The backing worker tore the request or registration down before it
    /// completed, reported over the bus as a `CANCELLED` reply code.
    #[error("operation cancelled by the backing store")]
    Cancelled,

    /// The connection has been closed; dispatch fails fast.
    #[error("connection is closed")]
    ConnectionClosed,

    /// No worker is consuming the operation's topic.
    #[error("no worker consuming topic '{0}'")]
    NoWorker(String),
}

impl StoreError {
    /// Check whether this error reports document absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Check whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

impl From<BusError> for StoreError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout(bound) => StoreError::Timeout(bound),
            BusError::Closed => StoreError::ConnectionClosed,
            BusError::NoConsumer(topic) => StoreError::NoWorker(topic.to_string()),
            BusError::Reply { code, message } => {
                if code == CODE_NOT_FOUND {
                    StoreError::NotFound(message)
                } else if code == CODE_CANCELLED {
                    StoreError::Cancelled
                } else {
                    StoreError::Backend { code, message }
                }
            }
        }
    }
}
