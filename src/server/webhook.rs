//! Webhook endpoint handler.
//!
//! Accepts Stripe webhook deliveries, verifies their signatures, and records
//! the event id so that each event is accepted at most once. Every request
//! ends in exactly one of three outcomes:
//!
//! | Outcome     | Status | Meaning                         |
//! |-------------|--------|---------------------------------|
//! | `Rejected`  | 400    | signature missing or invalid    |
//! | `Accepted`  | 200    | first time this event is seen   |
//! | `Duplicate` | 208    | event id already recorded       |

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use super::AppState;
use crate::dedupe::Insertion;
use crate::types::EventId;

/// Header carrying the Stripe signature.
pub const HEADER_SIGNATURE: &str = "stripe-signature";

/// Terminal state of a webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Signature missing or invalid. The body was not parsed and the seen
    /// set was not touched.
    Rejected,
    /// First delivery of this event id.
    Accepted,
    /// The event id was already accepted by this process.
    Duplicate,
}

impl WebhookOutcome {
    pub fn status_code(self) -> StatusCode {
        match self {
            WebhookOutcome::Rejected => StatusCode::BAD_REQUEST,
            WebhookOutcome::Accepted => StatusCode::OK,
            WebhookOutcome::Duplicate => StatusCode::ALREADY_REPORTED,
        }
    }

    /// Short diagnostic body, e.g. `status=208`.
    pub fn body(self) -> String {
        format!("status={}", self.status_code().as_u16())
    }
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        (self.status_code(), self.body()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Header: `Stripe-Signature: v1=<hex HMAC-SHA256 of the raw body>`
/// - Body: JSON event; only the top-level `id` is consumed
///
/// # Response
///
/// - 200 OK (`status=200`): event accepted for the first time
/// - 208 Already Reported (`status=208`): duplicate event id
/// - 400 Bad Request (`status=400`): missing or invalid signature
///
/// # Example
///
/// ```ignore
/// POST /stripe/webhook HTTP/1.1
/// Stripe-Signature: v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
/// Content-Type: application/json
///
/// {"id": "evt_1", "type": "payment_intent.succeeded"}
///
/// HTTP/1.1 200 OK
///
/// status=200
/// ```
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookOutcome {
    // A header that is not valid UTF-8 cannot carry a v1 token.
    let signature_header = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok());

    handle_delivery(&app_state, &body, signature_header)
}

/// Runs one delivery through verification and deduplication.
///
/// The signature is checked against the raw bytes before anything is
/// parsed. A verified body that is not JSON, or has no usable `id`, is
/// accepted under the anonymous id.
pub fn handle_delivery(
    app_state: &AppState,
    body: &[u8],
    signature_header: Option<&str>,
) -> WebhookOutcome {
    debug!(
        body_len = body.len(),
        has_signature = signature_header.is_some(),
        "Received webhook"
    );

    if !app_state.verifier().verify(body, signature_header) {
        warn!(
            has_signature = signature_header.is_some(),
            "Invalid webhook signature"
        );
        return WebhookOutcome::Rejected;
    }

    let body_json: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    let event_id = body_json
        .as_ref()
        .map(EventId::from_body)
        .unwrap_or_else(EventId::anonymous);
    let event_type = body_json
        .as_ref()
        .and_then(|b| b.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or("");

    if body_json.is_none() {
        debug!("Verified webhook body is not JSON; using anonymous event id");
    }

    match app_state.seen().record(&event_id) {
        Insertion::FirstSeen => {
            info!(
                event_id = %event_id,
                event_type = %event_type,
                "Webhook event accepted"
            );
            WebhookOutcome::Accepted
        }
        Insertion::Duplicate => {
            debug!(
                event_id = %event_id,
                event_type = %event_type,
                "Duplicate webhook event (already reported)"
            );
            WebhookOutcome::Duplicate
        }
    }
}
