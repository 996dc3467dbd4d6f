//! Facade composing duration tracking, encoding, and storage.

use crate::journal::{StoreError, ThreadStore};
use chrono::{DateTime, Utc};
use log::info;
use std::sync::Arc;
use tessera_rs_normalize::MessageFormatAdapter;
use tessera_rs_protocol::{DecodedMessage, Message, MessageId, StoredMessageRecord, ThreadId};
use tessera_rs_track::DurationTracker;
use uuid::Uuid;

/// Write-through recorder for one thread session.
///
/// Owns the thread's [`DurationTracker`]; the tracker state lives and dies
/// with the recorder. Live snapshots go through [`ThreadRecorder::observe`]
/// before individual messages are persisted with
/// [`ThreadRecorder::persist`].
pub struct ThreadRecorder<A: MessageFormatAdapter> {
    /// Thread the recorder writes to.
    thread_id: ThreadId,
    /// Format adapter producing stored payloads.
    adapter: A,
    /// Timing state for in-flight reasoning units.
    tracker: DurationTracker,
    /// Persistence collaborator.
    store: Arc<dyn ThreadStore>,
}

impl<A: MessageFormatAdapter> ThreadRecorder<A> {
    /// Start a new thread and its recorder.
    pub fn create(
        adapter: A,
        store: Arc<dyn ThreadStore>,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let thread_id = Uuid::new_v4();
        store.create_thread(thread_id, now)?;
        info!("started thread recorder (thread_id={})", thread_id);
        Ok(Self {
            thread_id,
            adapter,
            tracker: DurationTracker::new(),
            store,
        })
    }

    /// Resume recording an existing thread with fresh tracker state.
    pub fn resume(
        thread_id: ThreadId,
        adapter: A,
        store: Arc<dyn ThreadStore>,
    ) -> Result<Self, StoreError> {
        if store.load_thread(thread_id)?.is_none() {
            return Err(StoreError::UnknownThread(thread_id));
        }
        Ok(Self {
            thread_id,
            adapter,
            tracker: DurationTracker::new(),
            store,
        })
    }

    /// Thread this recorder writes to.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Run one live snapshot through duration tracking.
    ///
    /// Returns whether any fragment changed; unchanged snapshots need no
    /// re-persist.
    pub fn observe(&mut self, messages: &mut [Message], now: DateTime<Utc>) -> bool {
        self.tracker.observe(messages, now)
    }

    /// Encode a message and save it under this thread.
    pub fn persist(
        &self,
        message: &Message,
        parent_id: Option<MessageId>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = StoredMessageRecord {
            id: self.adapter.message_id(message).clone(),
            parent_id,
            format: self.adapter.format().to_string(),
            content: self.adapter.encode(message),
        };
        self.store.save_message(self.thread_id, &record, now)
    }

    /// Load and decode every stored message of this thread.
    pub fn load(&self) -> Result<Vec<DecodedMessage>, StoreError> {
        let thread = self
            .store
            .load_thread(self.thread_id)?
            .ok_or(StoreError::UnknownThread(self.thread_id))?;
        Ok(thread
            .messages
            .into_iter()
            .map(|record| self.adapter.decode(record))
            .collect())
    }
}
