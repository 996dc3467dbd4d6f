//! Merging of reasoning fragments that share a correlation key.

use crate::correlate::correlation_key;
use std::collections::HashMap;
use tessera_rs_protocol::Fragment;

/// Texts collected for one correlation key.
struct Group {
    /// Position of the first member in the input sequence.
    first_index: usize,
    /// Member texts in original order.
    texts: Vec<String>,
}

/// Collapse same-key reasoning fragments into one fragment per key.
///
/// The merged fragment sits at the first member's position and carries the
/// first member's state and metadata; member texts join with a blank line.
/// Later-arriving per-paragraph metadata is discarded, not merged.
/// Keyless reasoning fragments always pass through standalone.
pub fn merge_reasoning(parts: Vec<Fragment>) -> Vec<Fragment> {
    let mut groups: HashMap<String, Group> = HashMap::new();
    for (index, part) in parts.iter().enumerate() {
        let Fragment::Reasoning { text, .. } = part else {
            continue;
        };
        let Some(key) = correlation_key(part) else {
            continue;
        };
        groups
            .entry(key)
            .or_insert_with(|| Group {
                first_index: index,
                texts: Vec::new(),
            })
            .texts
            .push(text.clone());
    }

    let mut merged = Vec::with_capacity(parts.len());
    for (index, part) in parts.into_iter().enumerate() {
        let Some(key) = correlation_key(&part) else {
            merged.push(part);
            continue;
        };
        let Some(group) = groups.get(&key) else {
            merged.push(part);
            continue;
        };
        if group.first_index != index {
            continue;
        }
        let Fragment::Reasoning {
            state,
            provider_metadata,
            ..
        } = part
        else {
            continue;
        };
        merged.push(Fragment::Reasoning {
            text: group.texts.join("\n\n"),
            state,
            provider_metadata,
        });
    }
    merged
}
