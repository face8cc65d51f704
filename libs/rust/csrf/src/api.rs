//! High-level API client over the dispatcher.
//!
//! Joins endpoints onto the backend URL, checks statuses and decodes
//! bodies. Login and registration go out without a token because no
//! session exists yet.

use crate::config::CsrfConfig;
use crate::dispatcher::{ApiRequest, MultipartPayload, RequestDispatcher};
use crate::error::{CsrfError, CsrfResult};
use crate::events::{SessionEvent, SessionEvents};
use crate::fetcher::{HttpTokenFetcher, TokenFetcher};
use crate::store::TokenStore;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use rust_common::build_http_client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    /// Body parsed as JSON
    Json(Value),
    /// Body that was not JSON
    Text(String),
    /// No body
    Empty,
}

impl ApiBody {
    /// JSON value, if the body was JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Consume into a JSON value; text becomes a JSON string, empty becomes null.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(v) => v,
            Self::Text(t) => Value::String(t),
            Self::Empty => Value::Null,
        }
    }
}

/// Which exempt call failed, for the fallback message.
#[derive(Debug, Clone, Copy)]
enum ExemptCall {
    Login,
    Register,
}

impl ExemptCall {
    const fn label(self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::Register => "Registration",
        }
    }
}

/// Session-guarded API client.
pub struct ApiClient<F: TokenFetcher = HttpTokenFetcher> {
    config: CsrfConfig,
    dispatcher: RequestDispatcher<F>,
    store: Arc<TokenStore<F>>,
    events: SessionEvents,
}

impl ApiClient<HttpTokenFetcher> {
    /// Build a client talking to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: CsrfConfig) -> CsrfResult<Self> {
        config.validate()?;
        let http = build_http_client(&config.http)?;
        let fetcher = HttpTokenFetcher::new(http.clone(), &config);
        let store = Arc::new(TokenStore::new(fetcher, SessionEvents::default()));
        Self::from_parts(config, http, store)
    }
}

impl<F: TokenFetcher> ApiClient<F> {
    /// Assemble a client from an existing store and HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured header name is invalid.
    pub fn from_parts(
        config: CsrfConfig,
        http: Client,
        store: Arc<TokenStore<F>>,
    ) -> CsrfResult<Self> {
        let header = config.header()?;
        let events = store.events().clone();
        let dispatcher = RequestDispatcher::new(http, Arc::clone(&store), header);
        Ok(Self {
            config,
            dispatcher,
            store,
            events,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Token store in use.
    #[must_use]
    pub const fn store(&self) -> &Arc<TokenStore<F>> {
        &self.store
    }

    /// Underlying dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &RequestDispatcher<F> {
        &self.dispatcher
    }

    /// Event hub.
    #[must_use]
    pub const fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Absolute URL for `endpoint`.
    #[must_use]
    pub fn url(&self, endpoint: &str) -> String {
        self.config.endpoint_url(endpoint)
    }

    /// `GET` an endpoint.
    ///
    /// # Errors
    ///
    /// Dispatch errors, or `Status` for a non-2xx answer.
    pub async fn get(&self, endpoint: &str) -> CsrfResult<ApiBody> {
        self.call(ApiRequest::get(self.url(endpoint))).await
    }

    /// `POST` a JSON body.
    ///
    /// # Errors
    ///
    /// Dispatch errors, or `Status` for a non-2xx answer.
    pub async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, data: &T) -> CsrfResult<ApiBody> {
        self.request_with_headers(Method::POST, endpoint, Some(data), HeaderMap::new())
            .await
    }

    /// `PUT` a JSON body.
    ///
    /// # Errors
    ///
    /// Dispatch errors, or `Status` for a non-2xx answer.
    pub async fn put<T: Serialize + ?Sized>(&self, endpoint: &str, data: &T) -> CsrfResult<ApiBody> {
        self.request_with_headers(Method::PUT, endpoint, Some(data), HeaderMap::new())
            .await
    }

    /// `PATCH` a JSON body.
    ///
    /// # Errors
    ///
    /// Dispatch errors, or `Status` for a non-2xx answer.
    pub async fn patch<T: Serialize + ?Sized>(&self, endpoint: &str, data: &T) -> CsrfResult<ApiBody> {
        self.request_with_headers(Method::PATCH, endpoint, Some(data), HeaderMap::new())
            .await
    }

    /// `DELETE` an endpoint.
    ///
    /// # Errors
    ///
    /// Dispatch errors, or `Status` for a non-2xx answer.
    pub async fn delete(&self, endpoint: &str) -> CsrfResult<ApiBody> {
        self.call(ApiRequest::delete(self.url(endpoint))).await
    }

    /// Send a request carrying extra headers, with an optional JSON body.
    ///
    /// A token header among `headers` is replaced by the stored token on
    /// state-changing methods and dropped on the others.
    ///
    /// # Errors
    ///
    /// Dispatch errors, or `Status` for a non-2xx answer.
    pub async fn request_with_headers<T: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&T>,
        headers: HeaderMap,
    ) -> CsrfResult<ApiBody> {
        let mut request = ApiRequest::new(method, self.url(endpoint)).headers(headers);
        if let Some(data) = data {
            request = request.json(to_json(data)?);
        }
        self.call(request).await
    }

    /// `GET` and deserialize the JSON body.
    ///
    /// # Errors
    ///
    /// Dispatch errors, `Status` for a non-2xx answer, `Protocol` if the
    /// body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> CsrfResult<T> {
        let response = self.dispatcher.send(ApiRequest::get(self.url(endpoint))).await?;
        Self::decode_json(ensure_success(response).await?).await
    }

    /// `POST` a JSON body and deserialize the JSON answer.
    ///
    /// # Errors
    ///
    /// Dispatch errors, `Status` for a non-2xx answer, `Protocol` if the
    /// body does not match `R`.
    pub async fn post_json<T, R>(&self, endpoint: &str, data: &T) -> CsrfResult<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = ApiRequest::post(self.url(endpoint)).json(to_json(data)?);
        let response = self.dispatcher.send(request).await?;
        Self::decode_json(ensure_success(response).await?).await
    }

    /// Upload a multipart form with the CSRF token attached.
    ///
    /// # Errors
    ///
    /// Dispatch errors, or `Status` for a non-2xx answer.
    #[instrument(skip(self, payload), fields(parts = payload.len()))]
    pub async fn upload_file(&self, endpoint: &str, payload: MultipartPayload) -> CsrfResult<ApiBody> {
        self.call(ApiRequest::post(self.url(endpoint)).multipart(payload))
            .await
    }

    /// Log in without a CSRF token; the response sets the session cookie.
    ///
    /// # Errors
    ///
    /// `Network`, or `Status` carrying the server's `message`/`error` text.
    #[instrument(skip(self, credentials))]
    pub async fn login<T: Serialize + ?Sized>(&self, endpoint: &str, credentials: &T) -> CsrfResult<Value> {
        self.exempt_post(ExemptCall::Login, endpoint, credentials).await
    }

    /// Register without a CSRF token.
    ///
    /// # Errors
    ///
    /// `Network`, or `Status` carrying the server's `message` text.
    #[instrument(skip(self, user_data))]
    pub async fn register<T: Serialize + ?Sized>(&self, endpoint: &str, user_data: &T) -> CsrfResult<Value> {
        self.exempt_post(ExemptCall::Register, endpoint, user_data).await
    }

    /// Log out, optionally notifying the backend, and always drop the token.
    #[instrument(skip(self))]
    pub async fn logout(&self, endpoint: Option<&str>) {
        if let Some(endpoint) = endpoint {
            if let Err(e) = self.post(endpoint, &serde_json::json!({})).await {
                warn!(error = %e, "Logout call failed; clearing local session anyway");
            }
        }
        self.store.clear().await;
        info!("Logged out");
    }

    /// Fetch a token up front, at application startup.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after publishing
    /// [`SessionEvent::InitializationFailed`].
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> CsrfResult<()> {
        match self.store.get_valid_token().await {
            Ok(_) => {
                info!("CSRF protection initialized");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize CSRF token");
                self.events.publish(SessionEvent::InitializationFailed {
                    kind: e.kind(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Dispatch, check the status and decode the body.
    async fn call(&self, request: ApiRequest) -> CsrfResult<ApiBody> {
        let response = self.dispatcher.send(request).await?;
        decode_body(ensure_success(response).await?).await
    }

    async fn exempt_post<T: Serialize + ?Sized>(
        &self,
        call: ExemptCall,
        endpoint: &str,
        data: &T,
    ) -> CsrfResult<Value> {
        let request = ApiRequest::post(self.url(endpoint))
            .json(to_json(data)?)
            .exempt();
        let response = self.dispatcher.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let server_message = match call {
                ExemptCall::Login => body
                    .get("message")
                    .or_else(|| body.get("error"))
                    .and_then(Value::as_str),
                ExemptCall::Register => body.get("message").and_then(Value::as_str),
            };
            let message = server_message.map_or_else(
                || format!("{} failed: {}", call.label(), status.as_u16()),
                str::to_string,
            );
            warn!(status = status.as_u16(), "{} rejected", call.label());
            return Err(CsrfError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Self::decode_json(response).await
    }

    async fn decode_json<T: DeserializeOwned>(response: Response) -> CsrfResult<T> {
        response
            .json()
            .await
            .map_err(|e| CsrfError::protocol(None, format!("Unexpected response body: {e}")))
    }
}

fn to_json<T: Serialize + ?Sized>(data: &T) -> CsrfResult<Value> {
    serde_json::to_value(data)
        .map_err(|e| CsrfError::invalid_request(format!("Body is not serializable: {e}")))
}

/// Turn a non-2xx response into `CsrfError::Status`.
async fn ensure_success(response: Response) -> CsrfResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = if text.trim().is_empty() {
        format!("HTTP error! status: {}", status.as_u16())
    } else {
        text
    };
    Err(CsrfError::Status {
        status: status.as_u16(),
        message,
    })
}

/// JSON first, text as fallback.
async fn decode_body(response: Response) -> CsrfResult<ApiBody> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| CsrfError::network(format!("Failed to read response body: {e}")))?;
    if bytes.is_empty() {
        return Ok(ApiBody::Empty);
    }
    Ok(serde_json::from_slice(&bytes).map_or_else(
        |_| ApiBody::Text(String::from_utf8_lossy(&bytes).into_owned()),
        ApiBody::Json,
    ))
}
