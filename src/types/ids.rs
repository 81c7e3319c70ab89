//! Newtype wrappers for domain identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Stripe event identifier (e.g. `evt_1NirD82eZvKYlo2C`).
///
/// This is the uniqueness key for deduplication. An empty identifier is
/// "anonymous": it is never recorded and never considered a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(s: impl Into<String>) -> Self {
        EventId(s.into())
    }

    /// The identifier used when a verified body carries no usable `id`.
    pub fn anonymous() -> Self {
        EventId(String::new())
    }

    /// Extracts the event id from a parsed webhook body.
    ///
    /// Strings are used verbatim; numbers and booleans use their textual form.
    /// Anything else (missing field, `null`, arrays, objects, non-object
    /// bodies) is anonymous.
    pub fn from_body(body: &serde_json::Value) -> Self {
        match body.get("id") {
            Some(serde_json::Value::String(s)) => EventId(s.clone()),
            Some(serde_json::Value::Number(n)) => EventId(n.to_string()),
            Some(serde_json::Value::Bool(b)) => EventId(b.to_string()),
            _ => EventId::anonymous(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "<anonymous>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        EventId(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}
