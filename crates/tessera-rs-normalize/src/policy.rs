//! Sanitization policy for provider metadata.

/// Metadata keys that never leave the trust boundary, matched literally in
/// every namespace.
///
/// Extending this list is a reviewed change to this constant, not a
/// runtime heuristic.
pub const DENY_KEYS: &[&str] = &["encryptedContent", "redactedData"];

/// Policy for scrubbing provider metadata before storage.
#[derive(Debug, Clone)]
pub struct SanitizePolicy {
    /// Keys stripped from every namespace.
    pub deny_keys: Vec<String>,
    /// Drop a namespace whose keys were all stripped, and drop the
    /// metadata map entirely when no namespace survives.
    pub drop_empty_namespaces: bool,
}

impl Default for SanitizePolicy {
    /// Default policy: the built-in deny list, empty namespaces dropped.
    fn default() -> Self {
        Self {
            deny_keys: DENY_KEYS.iter().map(|key| (*key).to_string()).collect(),
            drop_empty_namespaces: true,
        }
    }
}
