//! Error types for bus operations.

use crate::envelope::Topic;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during bus operations.
#[derive(Error, Debug)]
pub enum BusError {
    /// No reply arrived within the send timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection has been closed; sends fail fast.
    #[error("bus connection is closed")]
    Closed,

    /// No worker is consuming the topic.
    #[error("no consumer registered for topic '{0}'")]
    NoConsumer(Topic),

    /// The worker reported a failure for this request.
    #[error("worker failed request: [{code}] {message}")]
    Reply {
        /// Machine-readable failure code.
        code: String,
        /// Human-readable failure message.
        message: String,
    },
}

impl BusError {
    /// Check whether this is a reply failure with the given code.
    pub fn has_code(&self, code: &str) -> bool {
        matches!(self, BusError::Reply { code: c, .. } if c == code)
    }

    /// Check whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_code() {
        let err = BusError::Reply {
            code: "NOT_FOUND".to_string(),
            message: "no document".to_string(),
        };
        assert!(err.has_code("NOT_FOUND"));
        assert!(!err.has_code("INTERNAL"));
        assert!(!BusError::Closed.has_code("NOT_FOUND"));
    }

    #[test]
    fn test_is_timeout() {
        assert!(BusError::Timeout(Duration::from_secs(59)).is_timeout());
        assert!(!BusError::Closed.is_timeout());
    }
}
