//! Format adapter between the live message shape and stored records.

use crate::filter::filter_fragments;
use crate::merge::merge_reasoning;
use crate::policy::SanitizePolicy;
use crate::sanitize::sanitize_fragment;
use log::debug;
use tessera_rs_protocol::{DecodedMessage, Message, MessageId, MessagePayload, StoredMessageRecord};

/// Discriminator for the v1 reasoning-aware stream format.
pub const FORMAT_V1: &str = "tessera/v1";

/// Storage format seam between live messages and persisted payloads.
pub trait MessageFormatAdapter: Send + Sync {
    /// Format discriminator written into the storage envelope.
    fn format(&self) -> &'static str;

    /// Produce the storable payload for a live message.
    ///
    /// Never mutates the live message; the identifier travels on the
    /// storage envelope and is not duplicated in the payload.
    fn encode(&self, message: &Message) -> MessagePayload;

    /// Rebuild the live message shape from a stored record.
    ///
    /// Total over well-formed records; unknown payload fields pass
    /// through without validation.
    fn decode(&self, record: StoredMessageRecord) -> DecodedMessage;

    /// Stable identifier used to key stored records.
    fn message_id<'a>(&self, message: &'a Message) -> &'a MessageId;
}

/// Adapter for the v1 format: filter, then merge, then sanitize.
#[derive(Debug, Clone, Default)]
pub struct ReasoningFormatAdapter {
    /// Metadata scrubbing policy applied after merging.
    policy: SanitizePolicy,
}

impl ReasoningFormatAdapter {
    /// Create an adapter with a custom sanitization policy.
    pub fn new(policy: SanitizePolicy) -> Self {
        Self { policy }
    }
}

impl MessageFormatAdapter for ReasoningFormatAdapter {
    fn format(&self) -> &'static str {
        FORMAT_V1
    }

    fn encode(&self, message: &Message) -> MessagePayload {
        let parts = filter_fragments(message.payload.parts.clone());
        let parts = merge_reasoning(parts);
        let parts: Vec<_> = parts
            .into_iter()
            .map(|part| sanitize_fragment(part, &self.policy))
            .collect();
        debug!(
            "encoded message (message_id={}, parts_in={}, parts_out={})",
            message.id,
            message.payload.parts.len(),
            parts.len()
        );
        MessagePayload {
            role: message.payload.role.clone(),
            parts,
            rest: message.payload.rest.clone(),
        }
    }

    fn decode(&self, record: StoredMessageRecord) -> DecodedMessage {
        DecodedMessage {
            parent_id: record.parent_id,
            message: Message {
                id: record.id,
                payload: record.content,
            },
        }
    }

    fn message_id<'a>(&self, message: &'a Message) -> &'a MessageId {
        &message.id
    }
}
