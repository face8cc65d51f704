//! Property tests of the client against a mock backend.

use auth_csrf_client::ErrorKind;
use auth_integration_tests::MockBackend;
use proptest::prelude::*;
use test_utils::{endpoint_strategy, error_status_strategy};
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_endpoint_reaches_backend_path(endpoint in endpoint_strategy()) {
        runtime().block_on(async {
            let backend = MockBackend::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&backend.server)
                .await;

            let client = backend.client().unwrap();
            assert_eq!(client.url(&endpoint), format!("{}{endpoint}", backend.uri()));
            client.get(&endpoint).await.unwrap();

            let sent = backend.api_requests().await;
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].url.path(), endpoint);
        });
    }

    #[test]
    fn prop_token_endpoint_status_surfaces_as_protocol_error(status in error_status_strategy()) {
        runtime().block_on(async {
            let backend = MockBackend::start().await;
            backend.token_endpoint(ResponseTemplate::new(status)).await;

            let client = backend.client().unwrap();
            let err = client.initialize().await.unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Protocol);
            assert_eq!(err.status(), Some(status));
            assert!(!err.is_retryable());
            assert!(!client.store().has_valid_token().await);
        });
    }
}
