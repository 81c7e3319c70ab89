//! Webhook handling for Stripe events.
//!
//! This module provides signature verification for webhook payloads
//! (HMAC-SHA256 over the raw body, `v1` scheme).

pub mod signature;

pub use signature::{
    SignatureError, SignatureVerifier, compute_signature, format_signature_header,
    parse_signature_header, verify_signature,
};
