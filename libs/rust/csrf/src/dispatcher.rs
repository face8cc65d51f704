//! Request dispatch with CSRF token attachment and one-shot 403 recovery.

use crate::error::{CsrfError, CsrfResult};
use crate::events::{SessionEvent, SessionEvents};
use crate::fetcher::TokenFetcher;
use crate::store::TokenStore;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Methods that change server state and therefore carry a token.
const STATE_CHANGING: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Whether `method` must carry a CSRF token.
#[must_use]
pub fn is_state_changing(method: &Method) -> bool {
    STATE_CHANGING.contains(method)
}

/// Whether the request gets token handling at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protection {
    /// Token attached for state-changing methods
    #[default]
    Auto,
    /// Never attach a token (login, registration)
    Exempt,
}

/// One field of a multipart upload.
#[derive(Debug, Clone)]
enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Multipart body that can be rebuilt for a resend.
#[derive(Debug, Clone, Default)]
pub struct MultipartPayload {
    parts: Vec<MultipartPart>,
}

impl MultipartPayload {
    /// Empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a file field.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: None,
            bytes: bytes.into(),
        });
        self
    }

    /// Add a file field with an explicit MIME type.
    #[must_use]
    pub fn file_with_mime(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: Some(mime.into()),
            bytes: bytes.into(),
        });
        self
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn to_form(&self) -> CsrfResult<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                MultipartPart::Text { name, value } => form.text(name.clone(), value.clone()),
                MultipartPart::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime).map_err(|e| {
                            CsrfError::invalid_request(format!("Invalid MIME type {mime}: {e}"))
                        })?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

/// Request body.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// JSON document
    Json(serde_json::Value),
    /// Multipart form; the transport sets the content type and boundary
    Multipart(MultipartPayload),
}

/// A request handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Body
    pub body: RequestBody,
    /// Extra headers
    pub headers: HeaderMap,
    /// Token handling
    pub protection: Protection,
}

impl ApiRequest {
    /// Request without body or extra headers.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: RequestBody::Empty,
            headers: HeaderMap::new(),
            protection: Protection::Auto,
        }
    }

    /// `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// `POST` request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// `PUT` request.
    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// `PATCH` request.
    #[must_use]
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// `DELETE` request.
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Attach a multipart body.
    #[must_use]
    pub fn multipart(mut self, payload: MultipartPayload) -> Self {
        self.body = RequestBody::Multipart(payload);
        self
    }

    /// Add extra headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Skip token handling entirely.
    #[must_use]
    pub const fn exempt(mut self) -> Self {
        self.protection = Protection::Exempt;
        self
    }

    /// Whether this request goes through the token path.
    #[must_use]
    pub fn requires_token(&self) -> bool {
        self.protection == Protection::Auto && is_state_changing(&self.method)
    }
}

/// Progress of one logical protected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Nothing done yet
    Idle,
    /// Token obtained for the first attempt
    TokenAcquired,
    /// First attempt sent
    Sent,
    /// First attempt answered with 403
    RejectedOnce,
    /// Store cleared after the rejection
    TokenCleared,
    /// Fresh token obtained
    TokenReacquired,
    /// Second attempt sent
    ResentSent,
    /// Terminal: a non-403 response was received
    Success,
    /// Terminal: the second attempt was rejected too
    FinalFailure,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A completed dispatch with its path through [`DispatchState`].
#[derive(Debug)]
pub struct Dispatched {
    /// Final response
    pub response: Response,
    /// Network attempts made (1 or 2)
    pub attempts: u32,
    /// States visited, starting at `Idle`
    pub trace: Vec<DispatchState>,
}

/// Records and logs state transitions.
struct Transitions(Vec<DispatchState>);

impl Transitions {
    fn new() -> Self {
        Self(vec![DispatchState::Idle])
    }

    fn enter(&mut self, next: DispatchState) {
        if let Some(prev) = self.0.last() {
            debug!(from = %prev, to = %next, "Dispatch state transition");
        }
        self.0.push(next);
    }
}

/// Sends requests, attaching the CSRF token where required.
pub struct RequestDispatcher<F: TokenFetcher> {
    http: Client,
    store: Arc<TokenStore<F>>,
    header: HeaderName,
    events: SessionEvents,
}

impl<F: TokenFetcher> RequestDispatcher<F> {
    /// Create a dispatcher.
    ///
    /// `http` must be the cookie-carrying client the token was fetched with.
    #[must_use]
    pub fn new(http: Client, store: Arc<TokenStore<F>>, header: HeaderName) -> Self {
        let events = store.events().clone();
        Self {
            http,
            store,
            header,
            events,
        }
    }

    /// Token store in use.
    #[must_use]
    pub const fn store(&self) -> &Arc<TokenStore<F>> {
        &self.store
    }

    /// Send a request and return the final response.
    ///
    /// Non-403 statuses are returned as-is for the caller to interpret.
    ///
    /// # Errors
    ///
    /// `Network` when the server cannot be reached, the token fetch error
    /// when no token can be obtained, and `Rejected` when a protected
    /// request is refused twice.
    pub async fn send(&self, request: ApiRequest) -> CsrfResult<Response> {
        self.dispatch(request).await.map(|d| d.response)
    }

    /// Like [`RequestDispatcher::send`] but also reports the state trace.
    ///
    /// # Errors
    ///
    /// See [`RequestDispatcher::send`].
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn dispatch(&self, request: ApiRequest) -> CsrfResult<Dispatched> {
        let mut states = Transitions::new();

        if !request.requires_token() {
            debug!(protection = ?request.protection, "Sending without CSRF token");
            let response = self.transmit(&request, None).await?;
            states.enter(DispatchState::Sent);
            states.enter(DispatchState::Success);
            return Ok(Dispatched {
                response,
                attempts: 1,
                trace: states.0,
            });
        }

        let token = self.store.get_valid_token().await?;
        states.enter(DispatchState::TokenAcquired);
        let response = self.transmit(&request, Some(&token)).await?;
        states.enter(DispatchState::Sent);

        if response.status() != StatusCode::FORBIDDEN {
            states.enter(DispatchState::Success);
            return Ok(Dispatched {
                response,
                attempts: 1,
                trace: states.0,
            });
        }

        states.enter(DispatchState::RejectedOnce);
        warn!("Protected request rejected; retrying once with a fresh CSRF token");
        drop(response);

        self.store.clear().await;
        states.enter(DispatchState::TokenCleared);
        self.events.publish(SessionEvent::RetryingAfterRejection {
            method: request.method.clone(),
            url: request.url.clone(),
        });

        let token = self.store.get_valid_token().await?;
        states.enter(DispatchState::TokenReacquired);
        let response = self.transmit(&request, Some(&token)).await?;
        states.enter(DispatchState::ResentSent);

        if response.status() == StatusCode::FORBIDDEN {
            states.enter(DispatchState::FinalFailure);
            warn!("Protected request rejected after retry");
            self.events.publish(SessionEvent::SessionExpired {
                method: request.method.clone(),
                url: request.url.clone(),
            });
            return Err(CsrfError::Rejected { attempts: 2 });
        }

        states.enter(DispatchState::Success);
        Ok(Dispatched {
            response,
            attempts: 2,
            trace: states.0,
        })
    }

    /// One network attempt.
    async fn transmit(
        &self,
        request: &ApiRequest,
        token: Option<&SecretString>,
    ) -> CsrfResult<Response> {
        let mut headers = request.headers.clone();
        // Only the dispatcher decides whether the token header is present.
        headers.remove(&self.header);

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(token.expose_secret()).map_err(|_| {
                CsrfError::protocol(None, "CSRF token is not a valid header value")
            })?;
            value.set_sensitive(true);
            headers.insert(self.header.clone(), value);
        }

        let mut builder = self.http.request(request.method.clone(), &request.url);
        builder = match &request.body {
            RequestBody::Empty => builder.headers(headers),
            RequestBody::Json(body) => builder.headers(headers).json(body),
            RequestBody::Multipart(payload) => {
                headers.remove(CONTENT_TYPE);
                builder.headers(headers).multipart(payload.to_form()?)
            }
        };

        builder.send().await.map_err(|e| {
            warn!(error = %e, "Request failed in transport");
            CsrfError::from_transport(&e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changing_methods() {
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(is_state_changing(&method), "{method} should need a token");
        }
        for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE] {
            assert!(!is_state_changing(&method), "{method} should not need a token");
        }
    }

    #[test]
    fn test_requires_token() {
        assert!(ApiRequest::post("http://x/a").requires_token());
        assert!(ApiRequest::delete("http://x/a").requires_token());
        assert!(!ApiRequest::get("http://x/a").requires_token());
        assert!(!ApiRequest::post("http://x/login").exempt().requires_token());
    }

    #[test]
    fn test_multipart_payload_builds_form() {
        let payload = MultipartPayload::new()
            .text("employeeId", "E-17")
            .file_with_mime("image", "avatar.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(payload.len(), 2);
        assert!(payload.to_form().is_ok());
        // Rebuilding for a resend must work as well.
        assert!(payload.to_form().is_ok());
    }

    #[test]
    fn test_multipart_rejects_bad_mime() {
        let payload = MultipartPayload::new().file_with_mime("f", "a.bin", "not a mime", vec![1]);
        let err = payload.to_form().unwrap_err();
        assert!(matches!(err, CsrfError::InvalidRequest(_)));
    }

    #[test]
    fn test_headers_merge() {
        let mut extra = HeaderMap::new();
        extra.insert("x-request-id", HeaderValue::from_static("r-1"));
        let request = ApiRequest::post("http://x/a").headers(extra);
        assert_eq!(request.headers.get("x-request-id").unwrap(), "r-1");
    }
}
