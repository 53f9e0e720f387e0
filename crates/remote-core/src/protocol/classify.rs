//! Routing of outbound payloads to the IR or RF send channel.
//!
//! The broker backend exposes one send topic per signal family
//! (`IRSend` and `RfSend`).  Stored codes and ad-hoc payloads arrive as plain
//! text, so the family has to be inferred from the payload itself:
//!
//! 1. If the text decodes to a JSON object or array that carries an RF marker,
//!    it is an RF payload and is published unchanged.  An array carries one
//!    when any object inside it does.
//! 2. Any other JSON object or array is an IR payload and is published
//!    unchanged.
//! 3. Anything else (a raw timing sequence, a bare number or quoted string, a
//!    hex code) is wrapped as `{"Protocol": "IR", "Data": <text>}`.
//!
//! RF markers are: a key starting with `Rf` (`RfCode`, `RfSync`, `RfRaw`, …),
//! a `Protocol` string equal to `RF`, or a numeric `Protocol` (rc-switch
//! protocol index; IR protocols are always named).  Key and value matching is
//! case-insensitive.
//!
//! [`classify_payload`] is a pure function: the same input always produces
//! the same routing decision and body.

use serde_json::{json, Map, Value};

/// The signal family a payload is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadFamily {
    Ir,
    Rf,
}

impl PayloadFamily {
    /// Command suffix of the broker send topic for this family.
    pub fn topic_suffix(self) -> &'static str {
        match self {
            PayloadFamily::Ir => "IRSend",
            PayloadFamily::Rf => "RfSend",
        }
    }
}

/// A classified payload ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPayload {
    pub family: PayloadFamily,
    pub body: Value,
}

impl OutboundPayload {
    /// Renders the body as compact JSON text.
    pub fn to_json(&self) -> String {
        self.body.to_string()
    }
}

/// Classifies `payload` and builds the body to publish.
pub fn classify_payload(payload: &str) -> OutboundPayload {
    let literal = payload.trim();

    match serde_json::from_str::<Value>(literal) {
        Ok(body @ (Value::Object(_) | Value::Array(_))) => {
            let family = if carries_rf_marker(&body) {
                PayloadFamily::Rf
            } else {
                PayloadFamily::Ir
            };
            OutboundPayload { family, body }
        }
        _ => OutboundPayload {
            family: PayloadFamily::Ir,
            body: json!({ "Protocol": "IR", "Data": literal }),
        },
    }
}

fn carries_rf_marker(body: &Value) -> bool {
    match body {
        Value::Object(record) => is_rf_record(record),
        Value::Array(items) => items.iter().any(carries_rf_marker),
        _ => false,
    }
}

fn is_rf_record(record: &Map<String, Value>) -> bool {
    record.iter().any(|(key, value)| {
        if has_rf_prefix(key) {
            return true;
        }
        if key.eq_ignore_ascii_case("protocol") {
            return match value {
                Value::String(protocol) => protocol.trim().eq_ignore_ascii_case("rf"),
                Value::Number(_) => true,
                _ => false,
            };
        }
        false
    })
}

fn has_rf_prefix(key: &str) -> bool {
    key.get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("rf"))
}
