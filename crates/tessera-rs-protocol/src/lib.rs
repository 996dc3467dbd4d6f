//! Wire types for streamed chat threads, message fragments, and the
//! persisted record envelope shared with the storage collaborator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for a thread.
pub type ThreadId = Uuid;
/// Unique identifier for a message. Assigned once by the upstream stream
/// at message creation and never reused.
pub type MessageId = String;

/// Metadata namespace reserved for fields derived by this system.
pub const RESERVED_NAMESPACE: &str = "tessera";
/// Metadata key carrying a provider-assigned correlation id.
pub const CORRELATION_KEY: &str = "itemId";
/// Metadata key carrying a finalized reasoning duration in whole seconds.
pub const DURATION_KEY: &str = "duration";

/// Live message shape delivered by the update stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Message identifier, stable from creation.
    pub id: MessageId,
    /// Role, fragments, and free-form top-level fields.
    #[serde(flatten)]
    pub payload: MessagePayload,
}

/// Message content independent of its identifier.
///
/// The stored form is this payload: the identifier travels on the storage
/// envelope, so the payload never duplicates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    /// Role that produced the message.
    pub role: Role,
    /// Ordered content fragments.
    pub parts: Vec<Fragment>,
    /// Free-form top-level fields (annotations, arbitrary data). Unknown
    /// fields round-trip through here untouched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Speaker role for a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-generated message.
    System,
    /// User-authored message.
    User,
    /// Assistant-authored message.
    Assistant,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One content unit within a message.
///
/// Tags not modeled here (tool invocations included) deserialize into the
/// opaque variant and pass through the pipeline byte-stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Fragment {
    /// Plain text content.
    Text {
        /// Text payload.
        text: String,
    },
    /// Reasoning content, possibly split across several fragments that
    /// share a correlation id.
    #[serde(rename_all = "camelCase")]
    Reasoning {
        /// Reasoning text payload.
        text: String,
        /// Completion state while streaming.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<ReasoningState>,
        /// Provider metadata, namespace keyed. Kept as a raw value so a
        /// malformed map degrades to "no metadata" instead of failing the
        /// persistence path.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<Value>,
    },
    /// Streaming step boundary. Carries no content.
    StepStart,
    /// Reference to binary content. Excluded from persistence by policy.
    #[serde(rename_all = "camelCase")]
    File {
        /// Media type of the referenced content.
        media_type: String,
        /// Location of the referenced content.
        url: String,
    },
    /// Any other fragment, preserved verbatim.
    #[serde(untagged)]
    Opaque(Value),
}

/// Completion state of a reasoning fragment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningState {
    /// Still receiving deltas.
    Streaming,
    /// Finalized by the provider.
    Done,
}

/// Persisted record wrapper for one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessageRecord {
    /// Message identifier keying the record.
    pub id: MessageId,
    /// Identifier of the parent message, if any.
    pub parent_id: Option<MessageId>,
    /// Storage format discriminator.
    pub format: String,
    /// Encoded message payload.
    pub content: MessagePayload,
}

/// Result of decoding a stored record back into the live shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Identifier of the parent message, if any.
    pub parent_id: Option<MessageId>,
    /// Reconstructed live message.
    pub message: Message,
}
