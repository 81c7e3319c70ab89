//! Shared test helpers: signing, request builders, and an HTTP client for live receivers.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::Request;

use crate::server::WEBHOOK_PATH;
use crate::webhooks::{compute_signature, format_signature_header};

pub const TEST_SECRET: &str = "whsec_test";

/// Returns a valid `Stripe-Signature` header for `body` under [`TEST_SECRET`].
pub fn sign(body: &[u8]) -> String {
    format_signature_header(&compute_signature(body, TEST_SECRET.as_bytes()))
}

/// Builds a webhook POST with an optional signature header.
pub fn webhook_request(body: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

/// Builds a webhook POST without a `Stripe-Signature` header.
pub fn unsigned_request(body: &[u8]) -> Request<Body> {
    webhook_request(body, None)
}

/// POSTs a webhook delivery to a running receiver.
///
/// Returns the status code and the response body.
pub async fn post_webhook(addr: SocketAddr, body: &[u8], signature: Option<&str>) -> (u16, String) {
    let mut request = reqwest::Client::new()
        .post(format!("http://{addr}{WEBHOOK_PATH}"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.to_vec());
    if let Some(signature) = signature {
        request = request.header("Stripe-Signature", signature);
    }

    let response = request.send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}
