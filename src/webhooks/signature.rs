//! Stripe webhook signature verification using HMAC-SHA256.
//!
//! Stripe signs each delivery with a shared signing secret. The signature is
//! carried in the `Stripe-Signature` header, either bare (`v1=<hex>`) or as a
//! comma-separated list of elements (`t=1492774577,v1=<hex>,v0=<hex>`).
//!
//! The digest is computed over the raw request bytes. Verification must happen
//! before the body is parsed: re-serializing a parsed body can change its bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Element key of the signature scheme this receiver understands.
const SIGNATURE_SCHEME: &str = "v1";

/// Errors raised while constructing a [`SignatureVerifier`].
///
/// These only happen at startup. Once a verifier exists, verification is a
/// plain `bool` with no failure path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The signing secret is empty or whitespace only.
    #[error("webhook signing secret is empty")]
    EmptySecret,

    /// The HMAC implementation rejected the key.
    #[error("webhook signing secret is not a usable HMAC key")]
    InvalidKey,
}

/// Extracts the first `v1` signature token from a `Stripe-Signature` header.
///
/// Returns `None` when the header has no `v1` element. Only the first `v1`
/// element is considered; later ones are ignored. The token is not validated
/// here, so non-hex tokens come back as-is and simply fail verification.
///
/// # Examples
///
/// ```
/// use webhook_receiver::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("v1=abcd"), Some("abcd"));
/// assert_eq!(parse_signature_header("t=123,v1=abcd,v0=ffff"), Some("abcd"));
/// assert_eq!(parse_signature_header("v1=first,v1=second"), Some("first"));
///
/// assert!(parse_signature_header("").is_none());
/// assert!(parse_signature_header("garbage").is_none());
/// assert!(parse_signature_header("v0=abcd").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<&str> {
    header.split(',').find_map(|element| {
        let (key, value) = element.trim().split_once('=')?;
        (key.trim() == SIGNATURE_SCHEME).then_some(value.trim())
    })
}

/// Computes the HMAC-SHA256 signature of a payload using the given secret.
///
/// This is useful for testing purposes and for local senders.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a `Stripe-Signature` header value (`v1=<hex>`).
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{}={}", SIGNATURE_SCHEME, hex::encode(signature))
}

/// Verifies a `Stripe-Signature` header against a payload and secret.
///
/// Fails closed: a blank secret, a missing header, a header without a `v1`
/// element, or a token that is not the lowercase hex digest all return
/// `false`. The final comparison is constant-time.
///
/// # Examples
///
/// ```
/// use webhook_receiver::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let payload = br#"{"id":"evt_1","type":"x"}"#;
/// let secret = b"whsec_test";
///
/// let header = format_signature_header(&compute_signature(payload, secret));
/// assert!(verify_signature(payload, Some(&header), secret));
/// assert!(!verify_signature(payload, Some(&header), b"whsec_other"));
/// assert!(!verify_signature(payload, None, secret));
///
/// // An empty key is public knowledge, so it never verifies anything.
/// let forged = format_signature_header(&compute_signature(payload, b""));
/// assert!(!verify_signature(payload, Some(&forged), b""));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: Option<&str>, secret: &[u8]) -> bool {
    SignatureVerifier::new(secret).is_ok_and(|verifier| verifier.verify(payload, signature_header))
}

fn verify_with_mac(mut mac: HmacSha256, payload: &[u8], signature_header: Option<&str>) -> bool {
    let Some(token) = signature_header.and_then(parse_signature_header) else {
        return false;
    };

    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    // Length mismatch short-circuits inside ct_eq; the digest length is public.
    expected.as_bytes().ct_eq(token.as_bytes()).into()
}

/// Verifies webhook signatures against a fixed signing secret.
///
/// The secret is validated once in [`SignatureVerifier::new`]; a verifier
/// with an empty secret cannot be constructed. Each call to
/// [`verify`](Self::verify) clones the pre-keyed MAC, so verification is a
/// pure function of its inputs.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl SignatureVerifier {
    /// Creates a verifier for the given signing secret.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::EmptySecret`] for a blank secret, so that a
    /// misconfigured receiver can never run with a key everyone knows.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let secret = secret.as_ref();
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(SignatureError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
        Ok(SignatureVerifier { mac })
    }

    /// Returns `true` if `signature_header` carries the correct `v1` digest of `payload`.
    pub fn verify(&self, payload: &[u8], signature_header: Option<&str>) -> bool {
        verify_with_mac(self.mac.clone(), payload, signature_header)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
