//! Persistence for normalized chat threads using JSONL journals.
//!
//! This crate owns the storage seam ([`ThreadStore`]), the JSONL-backed
//! implementation, and the [`ThreadRecorder`] facade that runs live
//! snapshots through duration tracking and format encoding on their way
//! to storage.

mod journal;
mod recorder;

/// Storage seam, records, and the JSONL implementation.
pub use journal::{JsonlThreadStore, StoreError, ThreadRecord, ThreadStore, ThreadSummary};
/// Facade composing tracker, adapter, and store.
pub use recorder::ThreadRecorder;
