//! Error taxonomy for the alert pipeline

use thiserror::Error;

use crate::models::FailureReason;

/// Errors raised by the monitoring client, incident client and pipeline.
///
/// Variants carry rendered messages rather than source errors so the type
/// stays `Clone`: a single authentication result is shared with every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Bad credentials or an expired upstream session
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Request did not complete within its timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection failure, reset, or a 5xx/429 answer
    #[error("network error: {0}")]
    Network(String),

    /// Definitive 4xx answer other than auth
    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Alert entry could not be interpreted
    #[error("malformed alert data: {0}")]
    Malformed(String),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Map a non-success HTTP status to the matching error kind.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => BridgeError::Auth(format!("HTTP {}: {}", status, body)),
            408 => BridgeError::Timeout(format!("HTTP {}: {}", status, body)),
            429 | 500..=599 => BridgeError::Network(format!("HTTP {}: {}", status, body)),
            _ => BridgeError::Rejected { status, body },
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Timeout(_) | BridgeError::Network(_))
    }

    /// Failure reason reported in a dispatch outcome.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            BridgeError::Auth(_) => FailureReason::Auth,
            BridgeError::Timeout(_) => FailureReason::Timeout,
            BridgeError::Rejected { .. } | BridgeError::Malformed(_) => FailureReason::Rejected,
            BridgeError::Network(_) | BridgeError::Config(_) => FailureReason::Network,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout(err.to_string())
        } else if err.is_decode() {
            BridgeError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            BridgeError::from_status(status.as_u16(), err.to_string())
        } else {
            BridgeError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(BridgeError::from_status(401, ""), BridgeError::Auth(_)));
        assert!(matches!(BridgeError::from_status(403, ""), BridgeError::Auth(_)));
        assert!(matches!(BridgeError::from_status(503, ""), BridgeError::Network(_)));
        assert!(matches!(BridgeError::from_status(429, ""), BridgeError::Network(_)));
        assert!(matches!(
            BridgeError::from_status(400, "bad payload"),
            BridgeError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(BridgeError::Timeout("t".into()).is_transient());
        assert!(BridgeError::Network("n".into()).is_transient());
        assert!(!BridgeError::Auth("a".into()).is_transient());
        assert!(!BridgeError::Rejected { status: 400, body: String::new() }.is_transient());
    }

    #[test]
    fn test_failure_reason() {
        assert_eq!(
            BridgeError::Timeout("t".into()).failure_reason(),
            FailureReason::Timeout
        );
        assert_eq!(
            BridgeError::from_status(422, "").failure_reason(),
            FailureReason::Rejected
        );
        assert_eq!(BridgeError::from_status(401, "").failure_reason(), FailureReason::Auth);
    }
}
