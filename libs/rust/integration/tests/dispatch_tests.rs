//! Dispatcher state traces and header handling against a mock backend.

use auth_csrf_client::{ApiRequest, CsrfError, DispatchState};
use auth_integration_tests::{MockBackend, token_header};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use DispatchState::{
    Idle, RejectedOnce, ResentSent, Sent, Success, TokenAcquired, TokenCleared, TokenReacquired,
};

#[tokio::test]
async fn test_trace_for_accepted_write() {
    let backend = MockBackend::start().await;
    backend.issue_token_once("abc").await;
    Mock::given(method("POST"))
        .and(header("X-CSRF-Token", "abc"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&backend.server)
        .await;

    let client = backend.client().unwrap();
    let request = ApiRequest::post(client.url("/feedback/reply")).json(json!({"text": "hi"}));
    let dispatched = client.dispatcher().dispatch(request).await.unwrap();

    assert_eq!(dispatched.response.status().as_u16(), 201);
    assert_eq!(dispatched.attempts, 1);
    assert_eq!(dispatched.trace, vec![Idle, TokenAcquired, Sent, Success]);
}

#[tokio::test]
async fn test_trace_for_write_resent_after_rejection() {
    let backend = MockBackend::start().await;
    backend.issue_token_once("abc").await;
    backend.issue_token_once("def").await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("PUT"))
        .and(header("X-CSRF-Token", "def"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend.server)
        .await;

    let client = backend.client().unwrap();
    let request = ApiRequest::put(client.url("/employee/profile")).json(json!({"phone": "0771234567"}));
    let dispatched = client.dispatcher().dispatch(request).await.unwrap();

    assert_eq!(dispatched.attempts, 2);
    assert_eq!(
        dispatched.trace,
        vec![
            Idle,
            TokenAcquired,
            Sent,
            RejectedOnce,
            TokenCleared,
            TokenReacquired,
            ResentSent,
            Success,
        ]
    );
}

#[tokio::test]
async fn test_trace_for_read_and_exempt_write() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/customer/login"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend.server)
        .await;

    let client = backend.client().unwrap();
    let read = client
        .dispatcher()
        .dispatch(ApiRequest::get(client.url("/appointment/list")))
        .await
        .unwrap();
    let exempt = client
        .dispatcher()
        .dispatch(ApiRequest::post(client.url("/customer/login")).json(json!({})).exempt())
        .await
        .unwrap();

    for dispatched in [read, exempt] {
        assert_eq!(dispatched.attempts, 1);
        assert_eq!(dispatched.trace, vec![Idle, Sent, Success]);
    }
    assert_eq!(backend.token_fetches().await, 0);
}

#[tokio::test]
async fn test_dispatch_second_rejection_reports_attempts() {
    let backend = MockBackend::start().await;
    backend.issue_token_once("abc").await;
    backend.issue_token_once("def").await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&backend.server)
        .await;

    let client = backend.client().unwrap();
    let err = client
        .dispatcher()
        .dispatch(ApiRequest::delete(client.url("/appointment/12")))
        .await
        .unwrap_err();

    assert_eq!(err, CsrfError::Rejected { attempts: 2 });
    assert_eq!(backend.api_requests().await.len(), 2);
    assert_eq!(backend.token_fetches().await, 2);
}

#[tokio::test]
async fn test_token_unusable_as_header_is_not_cached() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/api/csrf-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"csrfToken": "ab\ncd"})))
        .up_to_n_times(1)
        .mount(&backend.server)
        .await;
    backend.issue_token_once("abc").await;
    Mock::given(method("POST"))
        .and(header("X-CSRF-Token", "abc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend.server)
        .await;

    let client = backend.client().unwrap();
    let err = client.post("/payment/initiate", &json!({"amount": 1500})).await.unwrap_err();
    assert!(matches!(err, CsrfError::Protocol { status: None, .. }), "{err:?}");
    assert!(client.store().cached_token().await.is_none());
    assert!(backend.api_requests().await.is_empty());

    client.post("/payment/initiate", &json!({"amount": 1500})).await.unwrap();
    assert_eq!(backend.token_fetches().await, 2);
    assert_eq!(token_header(&backend.api_requests().await[0]).as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_extra_headers_sent_and_token_header_overridden() {
    let backend = MockBackend::start().await;
    backend.issue_token_once("abc").await;
    Mock::given(method("PATCH"))
        .and(header("x-request-id", "req-17"))
        .and(header("X-CSRF-Token", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = backend.client().unwrap();
    let mut headers = HeaderMap::new();
    headers.insert("x-request-id", HeaderValue::from_static("req-17"));
    headers.insert("x-csrf-token", HeaderValue::from_static("forged"));
    let body = client
        .request_with_headers(
            Method::PATCH,
            "/appointment/12",
            Some(&json!({"status": "done"})),
            headers,
        )
        .await
        .unwrap();

    assert_eq!(body.into_json(), json!({"ok": true}));
    let sent = backend.api_requests().await;
    let tokens: Vec<_> = sent[0]
        .headers
        .get_all("x-csrf-token")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(tokens, vec!["abc"]);
}

#[tokio::test]
async fn test_extra_headers_on_read_drop_token_header() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend.server)
        .await;

    let client = backend.client().unwrap();
    let mut headers = HeaderMap::new();
    headers.insert("x-request-id", HeaderValue::from_static("req-18"));
    headers.insert("x-csrf-token", HeaderValue::from_static("forged"));
    client
        .request_with_headers::<()>(Method::GET, "/appointment/list", None, headers)
        .await
        .unwrap();

    let sent = backend.api_requests().await;
    assert!(token_header(&sent[0]).is_none());
    assert_eq!(sent[0].headers.get("x-request-id").unwrap(), "req-18");
    assert_eq!(backend.token_fetches().await, 0);
}
