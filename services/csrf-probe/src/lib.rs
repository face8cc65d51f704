//! CSRF Probe - checks that a portal backend enforces its anti-forgery
//! token the way the client expects.
//!
//! Four checks run in order against the live backend:
//! - a token can be fetched
//! - a protected read succeeds with the session
//! - the login endpoint answers without a token
//! - a write sent without a token is refused with 403

#![forbid(unsafe_code)]

pub mod config;

pub use config::{ConfigError, ProbeConfig};

use auth_csrf_client::{ApiClient, CsrfError, CsrfResult};
use reqwest::{Client, StatusCode};
use rust_common::build_http_client;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

/// Outcome of one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Check identifier
    pub name: &'static str,
    /// Whether the backend behaved as expected
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Response data or error detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl CheckResult {
    fn pass(name: &'static str, message: impl Into<String>, detail: Option<Value>) -> Self {
        Self {
            name,
            success: true,
            message: message.into(),
            detail,
        }
    }

    fn fail(name: &'static str, message: impl Into<String>, detail: Option<Value>) -> Self {
        Self {
            name,
            success: false,
            message: message.into(),
            detail,
        }
    }

    fn from_error(name: &'static str, err: &CsrfError) -> Self {
        Self::fail(
            name,
            err.to_string(),
            Some(json!({ "kind": format!("{:?}", err.kind()), "status": err.status() })),
        )
    }
}

/// All check outcomes for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    /// Backend under test
    pub backend: String,
    /// True when every check passed
    pub passed: bool,
    /// Individual outcomes, in run order
    pub results: Vec<CheckResult>,
}

impl ProbeReport {
    /// Number of failed checks.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Runs the checks against one backend.
pub struct Probe {
    config: ProbeConfig,
    client: ApiClient,
    raw: Client,
}

impl Probe {
    /// Build the session client and a separate cookie-less raw client.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client cannot be built.
    pub fn new(config: ProbeConfig) -> CsrfResult<Self> {
        let client = ApiClient::new(config.client.clone())?;
        let raw = build_http_client(&config.client.http.clone().without_session_cookies())?;
        Ok(Self {
            config,
            client,
            raw,
        })
    }

    /// Run every check in order.
    pub async fn run(&self) -> ProbeReport {
        let results = vec![
            self.check_token().await,
            self.check_protected_endpoint().await,
            self.check_exempt_endpoint().await,
            self.check_tokenless_write().await,
        ];
        for result in &results {
            if result.success {
                info!(check = result.name, "Check passed");
            } else {
                warn!(check = result.name, message = %result.message, "Check failed");
            }
        }
        ProbeReport {
            backend: self.config.client.base_url.clone(),
            passed: results.iter().all(|r| r.success),
            results,
        }
    }

    #[instrument(skip(self))]
    async fn check_token(&self) -> CheckResult {
        const NAME: &str = "csrfToken";
        match self.client.store().get_valid_token().await {
            Ok(_) => CheckResult::pass(NAME, "CSRF token retrieved successfully", None),
            Err(e) => CheckResult::from_error(NAME, &e),
        }
    }

    #[instrument(skip(self))]
    async fn check_protected_endpoint(&self) -> CheckResult {
        const NAME: &str = "protectedEndpoint";
        match self.client.get(&self.config.protected_path).await {
            Ok(body) => CheckResult::pass(
                NAME,
                "Protected endpoint accessible with the session",
                Some(body.into_json()),
            ),
            Err(e) => CheckResult::from_error(NAME, &e),
        }
    }

    /// Any answer other than 403 shows the endpoint does not demand a token.
    #[instrument(skip(self))]
    async fn check_exempt_endpoint(&self) -> CheckResult {
        const NAME: &str = "exemptedEndpoint";
        let credentials = json!({
            "email": self.config.login_email,
            "password": self.config.login_password.expose_secret(),
        });
        match self.client.login(&self.config.login_path, &credentials).await {
            Ok(_) => CheckResult::pass(NAME, "Exempted endpoint works without CSRF token", None),
            Err(CsrfError::Status { status, .. }) if status != StatusCode::FORBIDDEN.as_u16() => {
                CheckResult::pass(
                    NAME,
                    format!("Exempted endpoint answered without CSRF token (HTTP {status})"),
                    None,
                )
            }
            Err(e) => CheckResult::from_error(NAME, &e),
        }
    }

    #[instrument(skip(self))]
    async fn check_tokenless_write(&self) -> CheckResult {
        const NAME: &str = "maliciousRequest";
        let url = self.client.url(&self.config.write_path);
        let sent = self
            .raw
            .post(&url)
            .json(&json!({ "maliciousData": "This should be rejected" }))
            .send()
            .await;

        match sent {
            Ok(response) if response.status() == StatusCode::FORBIDDEN => CheckResult::pass(
                NAME,
                "CSRF protection working: request without token rejected",
                None,
            ),
            Ok(response) => CheckResult::fail(
                NAME,
                format!(
                    "Security vulnerability: request without token was not rejected (HTTP {})",
                    response.status().as_u16()
                ),
                None,
            ),
            Err(e) => CheckResult::from_error(NAME, &CsrfError::from_transport(&e)),
        }
    }
}
