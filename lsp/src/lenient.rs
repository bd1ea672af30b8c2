//! Lenient accessors over dynamic JSON.
//!
//! Peer payloads are parsed field by field: a missing or wrong-typed field
//! resolves to the documented default instead of failing the whole value.

use serde_json::Value;

/// `true` only for a literal JSON `true`.
pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// String field, or `""`.
pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Non-empty string field.
pub(crate) fn opt_str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Unsigned integer field that fits in `u32`.
pub(crate) fn u32_field(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

/// Array field, or an empty slice.
pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Whether a capability-style field is declared: `true` or an options object.
pub(crate) fn declared(value: &Value, key: &str) -> bool {
    matches!(value.get(key), Some(Value::Bool(true) | Value::Object(_)))
}

/// First character of every non-empty string in an array field.
pub(crate) fn trigger_chars(value: &Value, key: &str) -> Vec<char> {
    array_field(value, key)
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|s| s.chars().next())
        .collect()
}

/// Strings of an array field, skipping non-strings.
pub(crate) fn string_list(value: &Value, key: &str) -> Vec<String> {
    array_field(value, key)
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect()
}
