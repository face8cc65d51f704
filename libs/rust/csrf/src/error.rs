//! CSRF client error types using thiserror 2.0.
//!
//! Errors carry a coarse [`ErrorKind`] so UI code can tell an expired
//! session apart from an unreachable backend without parsing messages.
//! Every variant is `Clone` because a single token fetch fans its result
//! out to all callers waiting on it.

use rust_common::PlatformError;
use thiserror::Error;

/// CSRF client errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsrfError {
    /// Transport could not reach the server
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered the token endpoint with an unexpected status or body
    #[error("Protocol error: {message}")]
    Protocol {
        /// HTTP status, when the failure was a status code
        status: Option<u16>,
        /// Human readable detail
        message: String,
    },

    /// Protected request was rejected again after a fresh token
    #[error("Request rejected after {attempts} attempts; session expired")]
    Rejected {
        /// Number of attempts made, always 2
        attempts: u32,
    },

    /// Non-success status on a regular API call
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message from the response body or a generic description
        message: String,
    },

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for CSRF client operations.
pub type CsrfResult<T> = Result<T, CsrfError>;

/// Coarse error taxonomy for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Backend unreachable
    Network,
    /// Token endpoint misbehaved
    Protocol,
    /// Anti-forgery token rejected twice
    SessionExpired,
    /// Non-success HTTP status
    Http,
    /// Local misuse or misconfiguration
    Client,
}

impl CsrfError {
    /// Taxonomy bucket of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Rejected { .. } => ErrorKind::SessionExpired,
            Self::Status { .. } => ErrorKind::Http,
            Self::InvalidRequest(_) | Self::Config(_) => ErrorKind::Client,
        }
    }

    /// Check if error is retryable by the caller.
    ///
    /// Nothing in this crate retries network errors on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Short message suitable for showing to an end user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Network => "Network unavailable. Check your connection and try again.",
            ErrorKind::Protocol => "Could not start a secure session. Please try again.",
            ErrorKind::SessionExpired => "Session expired. Please try again.",
            ErrorKind::Http => "The server could not complete the request.",
            ErrorKind::Client => "The request could not be prepared.",
        }
    }

    /// HTTP status attached to this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => *status,
            Self::Status { status, .. } => Some(*status),
            Self::Rejected { .. } => Some(403),
            _ => None,
        }
    }

    /// Create a network error.
    #[must_use]
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a protocol error.
    #[must_use]
    pub fn protocol(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Protocol {
            status,
            message: msg.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Map a reqwest error raised while sending.
    ///
    /// Builder errors are local mistakes; anything else means the server
    /// was not reached or the exchange broke off.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<PlatformError> for CsrfError {
    fn from(err: PlatformError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CsrfError::protocol(Some(500), "Failed to fetch CSRF token: 500");
        assert_eq!(err.to_string(), "Protocol error: Failed to fetch CSRF token: 500");

        let err = CsrfError::Rejected { attempts: 2 };
        assert_eq!(
            err.to_string(),
            "Request rejected after 2 attempts; session expired"
        );
    }

    #[test]
    fn test_kinds_are_distinct_for_ui() {
        let expired = CsrfError::Rejected { attempts: 2 };
        let offline = CsrfError::network("connection refused");
        assert_eq!(expired.kind(), ErrorKind::SessionExpired);
        assert_eq!(offline.kind(), ErrorKind::Network);
        assert_ne!(expired.user_message(), offline.user_message());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CsrfError::network("timeout").is_retryable());
        assert!(!CsrfError::protocol(Some(500), "x").is_retryable());
        assert!(!CsrfError::Rejected { attempts: 2 }.is_retryable());
        assert!(!CsrfError::config("x").is_retryable());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(CsrfError::protocol(Some(502), "x").status(), Some(502));
        assert_eq!(CsrfError::protocol(None, "x").status(), None);
        assert_eq!(CsrfError::Rejected { attempts: 2 }.status(), Some(403));
        assert_eq!(CsrfError::network("x").status(), None);
    }

    #[test]
    fn test_from_platform_error() {
        let err: CsrfError = PlatformError::internal("no TLS backend").into();
        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(err, CsrfError::Config("Internal error: no TLS backend".to_string()));
    }
}
