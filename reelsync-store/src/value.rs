//! Bridging between `serde_json::Value` and the engine's `Any` values.
//!
//! Entities are stored as opaque `Any` trees inside the document's shared
//! collections. The engine represents every number as `f64`, so the reverse
//! conversion re-materializes integral floats as JSON integers; without that
//! step integer model fields would fail to deserialize after a round trip.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use yrs::Any;

/// Converts a JSON value into an engine `Any` value.
pub(crate) fn json_to_any(value: &JsonValue) -> Any {
    match value {
        JsonValue::Null => Any::Null,
        JsonValue::Bool(b) => Any::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            // f64 holds integers up to 2^53 exactly
            Some(i) if i.unsigned_abs() < (1 << 53) => Any::Number(i as f64),
            Some(i) => Any::BigInt(i),
            None => Any::Number(n.as_f64().unwrap_or(0.0)),
        },
        JsonValue::String(s) => Any::String(Arc::from(s.as_str())),
        JsonValue::Array(items) => {
            let converted: Vec<Any> = items.iter().map(json_to_any).collect();
            Any::Array(Arc::from(converted))
        }
        JsonValue::Object(map) => {
            let converted: HashMap<String, Any> = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_any(v)))
                .collect();
            Any::Map(Arc::new(converted))
        }
    }
}

/// Converts an engine `Any` value back into JSON.
pub(crate) fn any_to_json(any: &Any) -> JsonValue {
    match any {
        Any::Null | Any::Undefined => JsonValue::Null,
        Any::Bool(b) => JsonValue::Bool(*b),
        Any::Number(n) => {
            if n.fract() == 0.0 && n.abs() < (1u64 << 53) as f64 {
                JsonValue::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            }
        }
        Any::BigInt(i) => JsonValue::from(*i),
        Any::String(s) => JsonValue::String(s.to_string()),
        Any::Buffer(bytes) => {
            JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
        }
        Any::Array(items) => JsonValue::Array(items.iter().map(any_to_json).collect()),
        Any::Map(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), any_to_json(v)))
                .collect(),
        ),
    }
}

/// Reads the `id` field of a stored entity without full deserialization.
pub(crate) fn entry_id(any: &Any) -> Option<&str> {
    match any {
        Any::Map(map) => match map.get("id") {
            Some(Any::String(s)) => Some(s.as_ref()),
            _ => None,
        },
        _ => None,
    }
}
