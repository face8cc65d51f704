//! Token acquisition from the session backend.

use crate::clock::{Clock, SystemClock};
use crate::config::CsrfConfig;
use crate::error::{CsrfError, CsrfResult};
use crate::token::CsrfToken;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Source of fresh CSRF tokens.
///
/// Uses native async traits (Rust 2024).
pub trait TokenFetcher: Send + Sync + 'static {
    /// Perform one round trip and return a newly issued token.
    fn fetch(&self) -> impl Future<Output = CsrfResult<CsrfToken>> + Send;
}

/// Body of the token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "csrfToken")]
    csrf_token: Option<String>,
}

/// Fetches tokens with `GET <base_url><token_path>`.
///
/// The client must be the same cookie-carrying client used for the
/// protected calls, otherwise the token is bound to a different session.
#[derive(Debug, Clone)]
pub struct HttpTokenFetcher {
    http: Client,
    url: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl HttpTokenFetcher {
    /// Create a fetcher for the configured token endpoint.
    #[must_use]
    pub fn new(http: Client, config: &CsrfConfig) -> Self {
        Self {
            http,
            url: config.token_url(),
            ttl: config.token_ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used to stamp expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Token endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TokenFetcher for HttpTokenFetcher {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> CsrfResult<CsrfToken> {
        let response = self
            .http
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "CSRF token endpoint unreachable");
                CsrfError::from_transport(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "CSRF token endpoint returned error status");
            return Err(CsrfError::protocol(
                Some(status.as_u16()),
                format!("Failed to fetch CSRF token: {}", status.as_u16()),
            ));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CsrfError::protocol(None, format!("Malformed CSRF token response: {e}")))?;

        let value = body
            .csrf_token
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CsrfError::protocol(None, "CSRF token response missing csrfToken"))?;

        // The value goes out verbatim as a header; reject it before it is cached.
        if HeaderValue::from_str(&value).is_err() {
            warn!("CSRF token endpoint returned a token that is not a valid header value");
            return Err(CsrfError::protocol(None, "CSRF token is not a valid header value"));
        }

        debug!(ttl_secs = self.ttl.as_secs(), "Fetched CSRF token");
        Ok(CsrfToken::issued(value, self.clock.now(), self.ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_field_name() {
        let body: TokenResponse = serde_json::from_str(r#"{"csrfToken":"abc"}"#).unwrap();
        assert_eq!(body.csrf_token.as_deref(), Some("abc"));

        let body: TokenResponse = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert!(body.csrf_token.is_none());
    }

    #[test]
    fn test_fetcher_uses_config_url() {
        let config = CsrfConfig::new("https://api.example.com/").with_token_path("/csrf-token");
        let fetcher = HttpTokenFetcher::new(Client::new(), &config);
        assert_eq!(fetcher.url(), "https://api.example.com/csrf-token");
    }
}
