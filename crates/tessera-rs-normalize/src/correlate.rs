//! Correlation key extraction from fragment metadata.

use serde_json::Value;
use tessera_rs_protocol::{CORRELATION_KEY, Fragment};

/// Return the provider-assigned correlation key for a fragment, if any.
///
/// Scans every namespace of a reasoning fragment's metadata for an
/// `itemId` entry and returns the first match coerced to a string.
/// Missing or malformed metadata yields `None`; nothing here can fail.
pub fn correlation_key(fragment: &Fragment) -> Option<String> {
    let Fragment::Reasoning {
        provider_metadata: Some(metadata),
        ..
    } = fragment
    else {
        return None;
    };
    metadata.as_object()?.values().find_map(item_id)
}

/// Read an `itemId` entry from a single namespace value.
fn item_id(namespace: &Value) -> Option<String> {
    match namespace.as_object()?.get(CORRELATION_KEY)? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
