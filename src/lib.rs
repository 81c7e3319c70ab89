//! Stripe webhook receiver.
//!
//! An HTTP endpoint that authenticates Stripe event notifications with an
//! HMAC-SHA256 signature and accepts each event id at most once per process,
//! answering duplicates with `208 Already Reported`.

pub mod config;
pub mod dedupe;
pub mod server;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
