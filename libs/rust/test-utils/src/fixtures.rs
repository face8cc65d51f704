//! Test fixtures with sample data.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Token endpoint body carrying `token`.
#[must_use]
pub fn token_body(token: &str) -> Value {
    json!({ "csrfToken": token })
}

/// Token endpoint body without the token field.
#[must_use]
pub fn token_body_missing_field() -> Value {
    json!({ "status": "ok" })
}

/// Sample login credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleCredentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

impl SampleCredentials {
    /// Customer test account.
    #[must_use]
    pub fn customer() -> Self {
        Self {
            email: "test@example.com".to_string(),
            password: "testpassword".to_string(),
        }
    }
}

/// Sample mechanical repair appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SampleAppointment {
    /// Customer name
    pub customer_name: String,
    /// Vehicle registration number
    pub vehicle_number: String,
    /// Requested date, `YYYY-MM-DD`
    pub date: String,
    /// Requested slot, `HH:MM`
    pub time_slot: String,
}

impl SampleAppointment {
    /// A morning oil-change booking.
    #[must_use]
    pub fn mechanical() -> Self {
        Self {
            customer_name: "Nimal Perera".to_string(),
            vehicle_number: "CAB-4521".to_string(),
            date: "2026-11-02".to_string(),
            time_slot: "09:00".to_string(),
        }
    }
}

/// Backend error body for a failed login.
#[must_use]
pub fn login_error_body(message: &str) -> Value {
    json!({ "message": message })
}

/// Payment gateway response with an embedded auto-submit form.
#[must_use]
pub fn payment_gateway_html(action: &str) -> String {
    format!(
        r#"<div><form action="{action}" method="post"><input type="hidden" name="order_id" value="42"><script>document.forms[0].submit()</script></form></div>"#
    )
}
