// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload representation and its wire encoding.
//!
//! The HTTP layer works with typed JSON payloads; the worker RPC carries
//! string-to-string maps (the worker contract predates typed values).
//! Non-string values cross the wire JSON-encoded and are decoded back when
//! shaping the response.

use serde_json::Value;
use std::collections::HashMap;

/// A JSON-compatible key/value payload.
pub type Payload = serde_json::Map<String, Value>;

/// Encode a typed payload into the worker's string-map representation.
///
/// Strings pass through unchanged; every other value is JSON-encoded.
pub fn encode_payload(payload: &Payload) -> HashMap<String, String> {
    payload
        .iter()
        .map(|(key, value)| {
            let encoded = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), encoded)
        })
        .collect()
}

/// Decode a worker string-map back into a typed payload.
///
/// Values that parse as JSON recover their original type; everything else
/// stays a string. A string that itself looks like JSON (e.g. `"1"`) decodes
/// to the typed value, an accepted ambiguity of the worker contract.
pub fn decode_payload(data: &HashMap<String, String>) -> Payload {
    let mut payload = Payload::new();
    for (key, raw) in data {
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.clone()));
        payload.insert(key.clone(), value);
    }
    payload
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
