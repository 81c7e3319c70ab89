//! HTTP server for the webhook receiver.
//!
//! This module implements the HTTP server that:
//! - Accepts Stripe webhooks, verifies signatures, and deduplicates events
//! - Provides a health check for liveness probes
//!
//! # Endpoints
//!
//! - `POST /stripe/webhook` - Accepts Stripe webhook deliveries (200 / 208 / 400)
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

pub mod health;
pub mod receiver;
pub mod webhook;

pub use health::health_handler;
pub use receiver::{ServerError, WebhookReceiver};
pub use webhook::{WebhookOutcome, handle_delivery, webhook_handler};

use crate::dedupe::SeenSet;
use crate::webhooks::{SignatureError, SignatureVerifier};

/// Path the webhook endpoint is served on.
pub const WEBHOOK_PATH: &str = "/stripe/webhook";
/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. The verifier
/// is read-only after construction; the seen set synchronizes itself.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Verifier keyed with the webhook signing secret.
    verifier: SignatureVerifier,

    /// Event ids accepted since startup.
    seen: SeenSet,
}

impl AppState {
    /// Creates state with a fresh seen set.
    ///
    /// # Errors
    ///
    /// Fails if the secret is blank.
    pub fn new(webhook_secret: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        Ok(Self::with_parts(
            SignatureVerifier::new(webhook_secret)?,
            SeenSet::new(),
        ))
    }

    /// Creates state from an existing verifier and seen set.
    pub fn with_parts(verifier: SignatureVerifier, seen: SeenSet) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { verifier, seen }),
        }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.inner.verifier
    }

    pub fn seen(&self) -> &SeenSet {
        &self.inner.seen
    }

    /// Transport-free form of the webhook endpoint; see [`handle_delivery`].
    pub fn handle(&self, body: &[u8], signature_header: Option<&str>) -> WebhookOutcome {
        handle_delivery(self, body, signature_header)
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route(WEBHOOK_PATH, post(webhook_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(app_state)
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::test_utils::{TEST_SECRET, sign, unsigned_request, webhook_request};
    use crate::types::EventId;

    fn test_app_state() -> AppState {
        AppState::new(TEST_SECRET).unwrap()
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    // ─── Health endpoint tests ───

    #[tokio::test]
    async fn health_returns_200() {
        let app = build_router(test_app_state());

        let request = Request::builder()
            .uri(HEALTH_PATH)
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    // ─── Webhook endpoint tests ───

    #[tokio::test]
    async fn valid_event_then_duplicate() {
        let state = test_app_state();
        let body = br#"{"id":"evt_1","type":"x"}"#;

        let (status, text) = send(
            build_router(state.clone()),
            webhook_request(body, Some(&sign(body))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "status=200");

        let (status, text) = send(
            build_router(state.clone()),
            webhook_request(body, Some(&sign(body))),
        )
        .await;
        assert_eq!(status, StatusCode::ALREADY_REPORTED);
        assert_eq!(text, "status=208");
    }

    #[tokio::test]
    async fn duplicate_after_delay_is_still_duplicate() {
        let state = test_app_state();
        let body = br#"{"id":"evt_delay","type":"x"}"#;

        let (status, _) = send(
            build_router(state.clone()),
            webhook_request(body, Some(&sign(body))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (status, _) = send(
            build_router(state),
            webhook_request(body, Some(&sign(body))),
        )
        .await;
        assert_eq!(status, StatusCode::ALREADY_REPORTED);
    }

    #[tokio::test]
    async fn wrong_digest_returns_400_without_recording() {
        let state = test_app_state();
        let body = br#"{"id":"evt_1","type":"x"}"#;
        let zeros = format!("v1={}", "0".repeat(64));

        let (status, text) = send(
            build_router(state.clone()),
            webhook_request(body, Some(&zeros)),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "status=400");
        assert!(state.seen().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_returns_400() {
        let state = test_app_state();
        let body = br#"{"id":"evt_1","type":"x"}"#;

        let app = build_router(state.clone());
        let (status, text) = send(app, unsigned_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "status=400");
        assert!(state.seen().is_empty());
    }

    #[tokio::test]
    async fn event_without_id_returns_200_every_time() {
        let state = test_app_state();
        let body = br#"{"type":"x"}"#;

        for _ in 0..3 {
            let (status, _) = send(
                build_router(state.clone()),
                webhook_request(body, Some(&sign(body))),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert!(state.seen().is_empty());
    }

    #[tokio::test]
    async fn invalid_signature_never_mutates_seen_set() {
        let state = test_app_state();
        let body = br#"{"id":"evt_p4","type":"x"}"#;
        let tampered = br#"{"id":"evt_p4","type":"y"}"#;

        // Rejected before acceptance: id is still available.
        let (status, _) = send(
            build_router(state.clone()),
            webhook_request(body, Some(&sign(tampered))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!state.seen().contains(&EventId::new("evt_p4")));

        let (status, _) = send(
            build_router(state.clone()),
            webhook_request(body, Some(&sign(body))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Rejected after acceptance: still 400, set unchanged.
        let (status, _) = send(
            build_router(state.clone()),
            webhook_request(body, Some("v1=invalid-signature")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.seen().len(), 1);
    }

    #[tokio::test]
    async fn stripe_element_list_header_is_accepted() {
        let state = test_app_state();
        let body = br#"{"id":"evt_list","type":"x"}"#;
        let digest = sign(body);
        let header = format!("t=1700000000,{digest},v0=abc");

        let (status, _) = send(
            build_router(state),
            webhook_request(body, Some(&header)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn get_on_webhook_path_is_not_handled() {
        let app = build_router(test_app_state());
        let request = Request::builder()
            .method("GET")
            .uri(WEBHOOK_PATH)
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn separate_states_do_not_share_events() {
        let body = br#"{"id":"evt_shared","type":"x"}"#;

        for _ in 0..2 {
            let (status, _) = send(
                build_router(test_app_state()),
                webhook_request(body, Some(&sign(body))),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_accept_exactly_once() {
        const REQUESTS: usize = 32;

        let state = test_app_state();
        let app = build_router(state.clone());
        let body = br#"{"id":"evt_concurrent","type":"x"}"#;
        let sig = sign(body);

        let tasks: Vec<_> = (0..REQUESTS)
            .map(|_| {
                let app = app.clone();
                let request = webhook_request(body, Some(&sig));
                tokio::spawn(async move { app.oneshot(request).await.unwrap().status() })
            })
            .collect();

        let mut accepted = 0;
        let mut duplicates = 0;
        for task in tasks {
            let status = task.await.unwrap();
            if status == StatusCode::OK {
                accepted += 1;
            } else if status == StatusCode::ALREADY_REPORTED {
                duplicates += 1;
            } else {
                panic!("unexpected status {status}");
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(duplicates, REQUESTS - 1);
        assert_eq!(state.seen().len(), 1);
    }
}
