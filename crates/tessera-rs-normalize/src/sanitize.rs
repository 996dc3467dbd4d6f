//! Deny-list scrubbing of fragment metadata.

use crate::policy::SanitizePolicy;
use serde_json::{Map, Value};
use tessera_rs_protocol::Fragment;

/// Scrub deny-listed keys from every namespace of a metadata map.
///
/// Non-object metadata passes through unchanged; values under kept keys
/// are copied opaquely, one level deep. A namespace emptied by scrubbing
/// is kept as an empty object or dropped per the policy; a namespace that
/// was already empty on input is always kept. Returns `None` when the
/// policy leaves nothing to store.
pub fn sanitize_metadata(metadata: Option<&Value>, policy: &SanitizePolicy) -> Option<Value> {
    let metadata = metadata?;
    let Some(namespaces) = metadata.as_object() else {
        return Some(metadata.clone());
    };

    let mut scrubbed = Map::new();
    for (namespace, value) in namespaces {
        let Some(entries) = value.as_object() else {
            scrubbed.insert(namespace.clone(), value.clone());
            continue;
        };
        let kept: Map<String, Value> = entries
            .iter()
            .filter(|(key, _)| !policy.deny_keys.iter().any(|denied| denied == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if kept.is_empty() && !entries.is_empty() && policy.drop_empty_namespaces {
            continue;
        }
        scrubbed.insert(namespace.clone(), Value::Object(kept));
    }

    if scrubbed.is_empty() && !namespaces.is_empty() && policy.drop_empty_namespaces {
        return None;
    }
    Some(Value::Object(scrubbed))
}

/// Scrub a single fragment's metadata per the policy.
///
/// Only reasoning fragments carry a metadata map; everything else passes
/// through untouched.
pub fn sanitize_fragment(fragment: Fragment, policy: &SanitizePolicy) -> Fragment {
    match fragment {
        Fragment::Reasoning {
            text,
            state,
            provider_metadata,
        } => Fragment::Reasoning {
            text,
            state,
            provider_metadata: sanitize_metadata(provider_metadata.as_ref(), policy),
        },
        other => other,
    }
}
