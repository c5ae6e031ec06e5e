//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ack::state::{AckKey, AckRecord};
use crate::error::DatabaseError;

/// A processed-set entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessage {
    pub message_id: String,
    pub processed_at: DateTime<Utc>,
    /// Outcome label recorded by the watcher.
    pub outcome: String,
}

/// Backend-agnostic database trait covering the processed set and
/// acknowledgement records.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Processed set ───────────────────────────────────────────────

    /// Whether `message_id` has already been handled.
    async fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Add `message_id` to the processed set. Re-marking keeps the first entry.
    async fn mark_processed(&self, message_id: &str, outcome: &str)
    -> Result<(), DatabaseError>;

    /// All processed entries, oldest first.
    async fn processed_messages(&self) -> Result<Vec<ProcessedMessage>, DatabaseError>;

    // ── Acknowledgements ────────────────────────────────────────────

    async fn get_ack(&self, key: &AckKey) -> Result<Option<AckRecord>, DatabaseError>;

    /// Insert or overwrite the record for its key (last-writer-wins).
    ///
    /// Returns the stored record with its new version.
    async fn put_ack(&self, record: &AckRecord) -> Result<AckRecord, DatabaseError>;

    /// Overwrite the record only if its stored version is still
    /// `expected_version`. Returns the stored record on success, `None`
    /// when another writer got there first (or the record is gone).
    async fn compare_and_swap_ack(
        &self,
        expected_version: i64,
        record: &AckRecord,
    ) -> Result<Option<AckRecord>, DatabaseError>;

    /// All records, oldest first.
    async fn list_acks(&self) -> Result<Vec<AckRecord>, DatabaseError>;
}
