//! Session-guarded API client for the service portal backend.
//!
//! State-changing calls carry an anti-forgery token fetched from the
//! backend session. The token is cached for a fixed window, fetched at most
//! once at a time however many callers ask, and re-fetched once when the
//! backend rejects a request with 403.
//!
//! ```no_run
//! use auth_csrf_client::{ApiClient, CsrfConfig};
//!
//! # async fn run() -> auth_csrf_client::CsrfResult<()> {
//! let client = ApiClient::new(CsrfConfig::new("https://api.example.com"))?;
//! client.initialize().await?;
//! client.post("/appointment/addmechanicalAppointment", &serde_json::json!({"slot": "09:00"})).await?;
//! client.logout(Some("/customer/logout")).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod sanitize;
pub mod store;
pub mod token;

pub use api::{ApiBody, ApiClient};
pub use clock::{Clock, SystemClock};
pub use config::CsrfConfig;
pub use dispatcher::{
    ApiRequest, DispatchState, Dispatched, MultipartPayload, Protection, RequestBody,
    RequestDispatcher, is_state_changing,
};
pub use error::{CsrfError, CsrfResult, ErrorKind};
pub use events::{SessionEvent, SessionEvents};
pub use fetcher::{HttpTokenFetcher, TokenFetcher};
pub use sanitize::{
    HtmlSanitizer, PaymentForm, ResponseSanitizer, SanitizeError, SanitizePolicy, SanitizedForm,
    pdf_footer, pdf_header,
};
pub use store::TokenStore;
pub use token::{CsrfToken, DEFAULT_TOKEN_TTL};
