//! Shared proptest generators.

use proptest::prelude::*;
use reqwest::Method;
use std::time::Duration;

/// Opaque token values as the backend issues them.
pub fn token_value_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{16,64}"
}

/// Methods that must carry a token.
pub fn state_changing_method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::POST),
        Just(Method::PUT),
        Just(Method::PATCH),
        Just(Method::DELETE),
    ]
}

/// Methods that never carry a token.
pub fn read_only_method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::GET),
        Just(Method::HEAD),
        Just(Method::OPTIONS),
        Just(Method::TRACE),
    ]
}

/// Non-2xx statuses the token endpoint may answer with.
pub fn error_status_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![300u16..400, 400u16..500, 500u16..600]
}

/// Offsets within a 30 minute window, in seconds.
pub fn within_ttl_strategy() -> impl Strategy<Value = Duration> {
    (0u64..1800).prop_map(Duration::from_secs)
}

/// Offsets at or beyond a 30 minute window, in seconds.
pub fn beyond_ttl_strategy() -> impl Strategy<Value = Duration> {
    (1800u64..86_400).prop_map(Duration::from_secs)
}

/// API endpoints of the portal backend.
pub fn endpoint_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("/appointment/addmechanicalAppointment".to_string()),
        Just("/appointment/addaccidentalAppointment".to_string()),
        Just("/employee/update-profile-image".to_string()),
        Just("/feedback/reply".to_string()),
        Just("/payment/initiate".to_string()),
        prop::collection::vec("[a-z][a-z0-9-]{2,12}", 1..4)
            .prop_map(|segments| format!("/{}", segments.join("/"))),
    ]
}
