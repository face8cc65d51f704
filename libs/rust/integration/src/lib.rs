//! Mock backend harness for end-to-end tests of the CSRF client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use auth_csrf_client::config::{DEFAULT_HEADER_NAME, DEFAULT_TOKEN_PATH};
use auth_csrf_client::{ApiClient, CsrfConfig, CsrfResult};
use rust_common::HttpConfig;
use std::time::Duration;
use test_utils::fixtures::token_body;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// A mock portal backend plus helpers to script its token endpoint.
pub struct MockBackend {
    /// Underlying server
    pub server: MockServer,
}

impl MockBackend {
    /// Start an empty backend.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the backend.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Client configuration pointing at this backend.
    #[must_use]
    pub fn config(&self) -> CsrfConfig {
        CsrfConfig::new(self.uri())
            .with_http(HttpConfig::default().with_timeout(Duration::from_secs(5)))
    }

    /// Client for this backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn client(&self) -> CsrfResult<ApiClient> {
        ApiClient::new(self.config())
    }

    /// Answer the next token request with `token`.
    pub async fn issue_token_once(&self, token: &str) {
        Mock::given(method("GET"))
            .and(path(DEFAULT_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Answer every token request with `response`.
    pub async fn token_endpoint(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(DEFAULT_TOKEN_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Requests received so far, excluding token fetches.
    pub async fn api_requests(&self) -> Vec<Request> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() != DEFAULT_TOKEN_PATH)
            .collect()
    }

    /// Number of token fetches received so far.
    pub async fn token_fetches(&self) -> usize {
        self.requests()
            .await
            .iter()
            .filter(|r| r.url.path() == DEFAULT_TOKEN_PATH)
            .count()
    }

    async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

/// Token header carried by `request`, if any.
#[must_use]
pub fn token_header(request: &Request) -> Option<String> {
    request
        .headers
        .get(DEFAULT_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
