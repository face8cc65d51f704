//! Anti-forgery token with a fixed validity window.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::{Duration, Instant};

/// How long a freshly issued token is trusted.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// A single CSRF token issued by the session backend.
///
/// The value is opaque and never shown by `Debug`.
#[derive(Clone)]
pub struct CsrfToken {
    value: SecretString,
    expires_at: Instant,
}

impl CsrfToken {
    /// Token issued at `issued_at` and valid for `ttl`.
    #[must_use]
    pub fn issued(value: impl Into<String>, issued_at: Instant, ttl: Duration) -> Self {
        Self {
            value: SecretString::from(value.into()),
            // An unrepresentable expiry is treated as already expired.
            expires_at: issued_at.checked_add(ttl).unwrap_or(issued_at),
        }
    }

    /// The secret value.
    #[must_use]
    pub const fn value(&self) -> &SecretString {
        &self.value
    }

    /// The raw value, for attaching to a request header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Absolute expiry.
    #[must_use]
    pub const fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// A token is valid iff `now < expires_at`.
    #[must_use]
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
