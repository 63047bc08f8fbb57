//! Serialization of query results into cache entries.
//!
//! Entries are UTF-8 JSON text. Reading is strict: only a JSON object or
//! array counts as a usable entry, anything else is treated as corrupt.

use serde_json::Value;

/// Serialize a result for storage.
pub fn serialize(result: &Value) -> serde_json::Result<String> {
    serde_json::to_string(result)
}

/// Deserialize a stored result.
pub fn deserialize(bytes: &[u8]) -> serde_json::Result<Value> {
    serde_json::from_slice(bytes)
}

/// Decode a stored entry, returning `None` when it must be recomputed.
///
/// Empty values, unparsable text and scalar or `null` payloads are all
/// rejected so that placeholder entries never short-circuit a query.
pub fn decode_entry(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }

    match deserialize(bytes) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}
