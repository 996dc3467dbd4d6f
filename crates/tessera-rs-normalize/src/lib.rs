//! Normalization pipeline for streamed chat messages.
//!
//! This crate owns the pure transforms applied before a message is stored:
//! transient fragment filtering, correlation-keyed reasoning merges,
//! metadata sanitization, and the format adapter composing them.

pub mod adapter;
pub mod correlate;
pub mod filter;
pub mod merge;
pub mod policy;
pub mod sanitize;

/// Format adapter seam and the v1 implementation.
pub use adapter::{FORMAT_V1, MessageFormatAdapter, ReasoningFormatAdapter};
/// Correlation key extraction.
pub use correlate::correlation_key;
/// Transient fragment filtering.
pub use filter::filter_fragments;
/// Correlation-keyed reasoning merges.
pub use merge::merge_reasoning;
/// Sanitization policy and deny list.
pub use policy::{DENY_KEYS, SanitizePolicy};
/// Metadata sanitization.
pub use sanitize::{sanitize_fragment, sanitize_metadata};
