//! CSRF client configuration.

use crate::error::{CsrfError, CsrfResult};
use crate::token::DEFAULT_TOKEN_TTL;
use reqwest::header::HeaderName;
use rust_common::HttpConfig;
use std::time::Duration;

/// Default token endpoint, relative to the backend URL.
pub const DEFAULT_TOKEN_PATH: &str = "/api/csrf-token";

/// Header carrying the token on state-changing requests.
pub const DEFAULT_HEADER_NAME: &str = "X-CSRF-Token";

/// CSRF client configuration.
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Backend base URL, e.g. `https://api.example.com`
    pub base_url: String,
    /// Token endpoint path
    pub token_path: String,
    /// Request header name for the token
    pub header_name: String,
    /// Validity window of a fetched token
    pub token_ttl: Duration,
    /// Transport settings
    pub http: HttpConfig,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            header_name: DEFAULT_HEADER_NAME.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            http: HttpConfig::default(),
        }
    }
}

impl CsrfConfig {
    /// Create a configuration for the given backend.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads a `.env` file first when present.
    ///
    /// # Errors
    ///
    /// Returns an error if `BACKEND_URL` is missing or a value is invalid.
    pub fn from_env() -> CsrfResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `BACKEND_URL` is missing or a value is invalid.
    pub fn from_lookup<L>(lookup: L) -> CsrfResult<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("BACKEND_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CsrfError::config("BACKEND_URL is required"))?;

        let mut config = Self::new(base_url);
        if let Some(path) = lookup("CSRF_TOKEN_PATH") {
            config.token_path = path;
        }
        if let Some(name) = lookup("CSRF_HEADER_NAME") {
            config.header_name = name;
        }
        config.token_ttl = Duration::from_secs(parse_var(
            &lookup,
            "CSRF_TOKEN_TTL_SECS",
            DEFAULT_TOKEN_TTL.as_secs(),
        )?);
        let timeout = parse_var(&lookup, "HTTP_TIMEOUT_SECS", config.http.timeout.as_secs())?;
        config.http = config.http.with_timeout(Duration::from_secs(timeout));

        config.validate()?;
        Ok(config)
    }

    /// Set token endpoint path.
    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Set token header name.
    #[must_use]
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set token validity window.
    #[must_use]
    pub const fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Set transport settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-http(s) base URL, an invalid header name
    /// or a zero TTL.
    pub fn validate(&self) -> CsrfResult<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| CsrfError::config(format!("Invalid BACKEND_URL {}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CsrfError::config(format!(
                "BACKEND_URL must use http or https, got {}",
                url.scheme()
            )));
        }
        self.header()?;
        if self.token_ttl.is_zero() {
            return Err(CsrfError::config("CSRF token TTL must be positive"));
        }
        Ok(())
    }

    /// Parsed token header name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid HTTP header name.
    pub fn header(&self) -> CsrfResult<HeaderName> {
        HeaderName::from_bytes(self.header_name.as_bytes())
            .map_err(|e| CsrfError::config(format!("Invalid CSRF header name {}: {e}", self.header_name)))
    }

    /// Absolute URL of the token endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        self.endpoint_url(&self.token_path)
    }

    /// Absolute URL for an endpoint relative to the backend.
    #[must_use]
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if endpoint.is_empty() {
            base.to_string()
        } else if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }
}

/// Parse an optional variable with a default value.
fn parse_var<L, T>(lookup: &L, name: &str, default: T) -> CsrfResult<T>
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| CsrfError::config(format!("Invalid {name}: {e}"))),
        None => Ok(default),
    }
}
