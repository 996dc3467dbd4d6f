//! Thread persistence using JSONL journals.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tessera_rs_protocol::{MessageId, StoredMessageRecord, ThreadId};
use thiserror::Error;
use uuid::Uuid;

/// Reconstructed thread with its stored messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRecord {
    /// Thread identifier.
    pub id: ThreadId,
    /// Thread creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Stored messages, latest revision each, in first-seen order.
    pub messages: Vec<StoredMessageRecord>,
}

/// Summary record used for listing threads.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSummary {
    /// Thread identifier.
    pub id: ThreadId,
    /// Count of distinct stored messages.
    pub message_count: usize,
    /// Thread creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent save.
    pub updated_at: DateTime<Utc>,
}

/// Persistent store abstraction for threads and their messages.
pub trait ThreadStore: Send + Sync {
    /// Record a new thread creation.
    fn create_thread(
        &self,
        thread_id: ThreadId,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Save a message record, replacing any earlier revision with its id.
    fn save_message(
        &self,
        thread_id: ThreadId,
        record: &StoredMessageRecord,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Load a thread record by id.
    fn load_thread(&self, thread_id: ThreadId) -> Result<Option<ThreadRecord>, StoreError>;
    /// List all thread summaries.
    fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError>;
    /// Delete a thread and its backing journal.
    fn delete_thread(&self, thread_id: ThreadId) -> Result<bool, StoreError>;
}

/// Errors returned by the thread store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing thread metadata")]
    MissingMetadata,
    #[error("thread already exists: {0}")]
    ThreadExists(ThreadId),
    #[error("unknown thread: {0}")]
    UnknownThread(ThreadId),
}

/// Internal JSONL event representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JournalEvent {
    SchemaVersion {
        version: u32,
    },
    ThreadCreated {
        thread_id: ThreadId,
        created_at: DateTime<Utc>,
    },
    MessageSaved {
        thread_id: ThreadId,
        record: StoredMessageRecord,
        saved_at: DateTime<Utc>,
    },
}

/// Replay accumulator for one journal.
///
/// Messages are re-saved as they grow, so replay keeps the last record
/// per message id while preserving first-seen order.
#[derive(Default)]
struct JournalState {
    version: Option<u32>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    order: Vec<MessageId>,
    records: HashMap<MessageId, StoredMessageRecord>,
}

impl JournalState {
    fn apply(&mut self, event: JournalEvent) -> Result<(), StoreError> {
        match event {
            JournalEvent::SchemaVersion { version } => {
                self.version = Some(version);
                if version > 1 {
                    return Err(StoreError::UnsupportedSchema(version));
                }
            }
            JournalEvent::ThreadCreated { created_at, .. } => {
                self.created_at = Some(created_at);
            }
            JournalEvent::MessageSaved {
                record, saved_at, ..
            } => {
                if !self.records.contains_key(&record.id) {
                    self.order.push(record.id.clone());
                }
                self.records.insert(record.id.clone(), record);
                self.updated_at = Some(saved_at);
            }
        }
        Ok(())
    }

    fn finish(self, thread_id: ThreadId) -> Result<ThreadRecord, StoreError> {
        let _ = self.version.ok_or(StoreError::MissingMetadata)?;
        let created_at = self.created_at.ok_or(StoreError::MissingMetadata)?;
        let mut records = self.records;
        let messages = self
            .order
            .into_iter()
            .filter_map(|id| records.remove(&id))
            .collect();
        Ok(ThreadRecord {
            id: thread_id,
            created_at,
            messages,
        })
    }

    fn summary(&self, thread_id: ThreadId) -> Option<ThreadSummary> {
        let created_at = self.created_at?;
        Some(ThreadSummary {
            id: thread_id,
            message_count: self.order.len(),
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        })
    }
}

/// JSONL-backed thread store implementation.
pub struct JsonlThreadStore {
    /// Root directory for thread journals.
    root: PathBuf,
    /// Serialize write access to journal files.
    write_lock: Mutex<()>,
}

impl JsonlThreadStore {
    /// Create a new JSONL store under the given root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL thread store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Build the journal file path for a thread.
    fn journal_path(&self, thread_id: ThreadId) -> PathBuf {
        self.root.join(format!("{thread_id}.jsonl"))
    }

    /// Append an event to an existing journal file.
    fn write_event(&self, thread_id: ThreadId, event: &JournalEvent) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.journal_path(thread_id);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Create a new journal file and write the initial event.
    fn write_new_journal(
        &self,
        thread_id: ThreadId,
        event: &JournalEvent,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.journal_path(thread_id);
        if path.exists() {
            return Err(StoreError::ThreadExists(thread_id));
        }
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        let header = serde_json::to_string(&JournalEvent::SchemaVersion { version: 1 })?;
        writeln!(file, "{header}")?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read and replay a journal into its accumulated state.
    fn read_journal(&self, thread_id: ThreadId) -> Result<Option<JournalState>, StoreError> {
        let path = self.journal_path(thread_id);
        if !path.exists() {
            return Ok(None);
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        let reader = BufReader::new(file);
        let mut journal = JournalState::default();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: JournalEvent = serde_json::from_str(&line)?;
            journal.apply(event)?;
        }
        Ok(Some(journal))
    }
}

impl ThreadStore for JsonlThreadStore {
    /// Record thread creation as a journal event.
    fn create_thread(
        &self,
        thread_id: ThreadId,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        info!("recording thread creation (thread_id={})", thread_id);
        let event = JournalEvent::ThreadCreated {
            thread_id,
            created_at,
        };
        self.write_new_journal(thread_id, &event)
    }

    /// Append a message revision to a thread journal.
    fn save_message(
        &self,
        thread_id: ThreadId,
        record: &StoredMessageRecord,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        debug!(
            "saving message record (thread_id={}, message_id={}, format={})",
            thread_id, record.id, record.format
        );
        let event = JournalEvent::MessageSaved {
            thread_id,
            record: record.clone(),
            saved_at,
        };
        self.write_event(thread_id, &event)
    }

    /// Load a thread from its journal file.
    fn load_thread(&self, thread_id: ThreadId) -> Result<Option<ThreadRecord>, StoreError> {
        match self.read_journal(thread_id)? {
            Some(journal) => Ok(Some(journal.finish(thread_id)?)),
            None => Ok(None),
        }
    }

    /// List all threads by scanning journal files.
    fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let file_name = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let thread_id = match Uuid::parse_str(file_name) {
                Ok(id) => id,
                Err(_) => continue,
            };
            if let Some(journal) = self.read_journal(thread_id)?
                && let Some(summary) = journal.summary(thread_id)
            {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Delete the journal file for a thread.
    fn delete_thread(&self, thread_id: ThreadId) -> Result<bool, StoreError> {
        let path = self.journal_path(thread_id);
        if path.exists() {
            info!("deleting thread journal (thread_id={})", thread_id);
            fs::remove_file(path)?;
            Ok(true)
        } else {
            warn!("thread journal not found (thread_id={})", thread_id);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonlThreadStore, StoreError, ThreadStore};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use std::io::Write;
    use tempfile::tempdir;
    use tessera_rs_protocol::{Fragment, MessagePayload, Role, StoredMessageRecord};
    use uuid::Uuid;

    fn record(id: &str, text: &str) -> StoredMessageRecord {
        StoredMessageRecord {
            id: id.to_string(),
            parent_id: None,
            format: "tessera/v1".to_string(),
            content: MessagePayload {
                role: Role::Assistant,
                parts: vec![Fragment::Text {
                    text: text.to_string(),
                }],
                rest: Map::new(),
            },
        }
    }

    #[test]
    fn journal_round_trips_message_revisions() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlThreadStore::new(temp.path()).expect("store");
        let thread_id = Uuid::new_v4();
        let created_at = Utc::now();
        store
            .create_thread(thread_id, created_at)
            .expect("create thread");

        store
            .save_message(thread_id, &record("msg_1", "draft"), created_at)
            .expect("save draft");
        store
            .save_message(thread_id, &record("msg_2", "reply"), created_at)
            .expect("save reply");
        store
            .save_message(thread_id, &record("msg_1", "final"), created_at)
            .expect("save final");

        let thread = store
            .load_thread(thread_id)
            .expect("load")
            .expect("thread");
        assert_eq!(thread.id, thread_id);
        assert_eq!(thread.created_at, created_at);
        assert_eq!(
            thread.messages,
            vec![record("msg_1", "final"), record("msg_2", "reply")]
        );
    }

    #[test]
    fn creating_a_thread_twice_fails() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlThreadStore::new(temp.path()).expect("store");
        let thread_id = Uuid::new_v4();
        store
            .create_thread(thread_id, Utc::now())
            .expect("create thread");
        let err = store
            .create_thread(thread_id, Utc::now())
            .expect_err("duplicate");
        match err {
            StoreError::ThreadExists(id) => assert_eq!(id, thread_id),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lists_threads_by_most_recent_save() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlThreadStore::new(temp.path()).expect("store");
        let created_at = Utc::now();

        let older = Uuid::new_v4();
        store.create_thread(older, created_at).expect("create");
        store
            .save_message(older, &record("msg_1", "old"), created_at)
            .expect("save");

        let newer = Uuid::new_v4();
        store.create_thread(newer, created_at).expect("create");
        store
            .save_message(
                newer,
                &record("msg_2", "new"),
                created_at + chrono::Duration::seconds(5),
            )
            .expect("save");

        let summaries = store.list_threads().expect("list");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, newer);
        assert_eq!(summaries[0].message_count, 1);
        assert_eq!(summaries[1].id, older);
    }

    #[test]
    fn delete_removes_the_journal() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlThreadStore::new(temp.path()).expect("store");
        let thread_id = Uuid::new_v4();
        store
            .create_thread(thread_id, Utc::now())
            .expect("create thread");

        assert_eq!(store.delete_thread(thread_id).expect("delete"), true);
        assert_eq!(
            store.load_thread(thread_id).expect("load after delete"),
            None
        );
        assert_eq!(store.delete_thread(thread_id).expect("redelete"), false);
    }

    #[test]
    fn rejects_unsupported_schema_versions() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlThreadStore::new(temp.path()).expect("store");
        let thread_id = Uuid::new_v4();

        let path = temp.path().join(format!("{thread_id}.jsonl"));
        let mut file = std::fs::File::create(&path).expect("journal");
        writeln!(file, r#"{{"type":"schema_version","version":2}}"#).expect("write");

        let err = store.load_thread(thread_id).expect_err("unsupported");
        match err {
            StoreError::UnsupportedSchema(version) => assert_eq!(version, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
