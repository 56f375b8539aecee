//! Deletion log repository trait.

use crate::error::SoftDeleteResult;
use crate::models::{DeleteLogRow, TypeCount};
use async_trait::async_trait;
use reclaim_core::{ActorId, LogEntryId, TransactionId};
use sqlx::SqliteConnection;
use time::OffsetDateTime;

/// Repository for per-entity deletion log entries.
#[async_trait]
pub trait DeletionLogRepo: Send + Sync {
    /// Record that an entity was deleted under a transaction.
    ///
    /// Returns `None` when the transaction is unknown or already closed.
    async fn insert_log_entry(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
        model_class: &str,
        row_id: &str,
    ) -> SoftDeleteResult<Option<LogEntryId>>;

    /// Find the outstanding entry for an entity.
    ///
    /// More than one outstanding entry for the same entity is an integrity fault.
    async fn find_outstanding_entry(
        &self,
        conn: &mut SqliteConnection,
        model_class: &str,
        row_id: &str,
    ) -> SoftDeleteResult<Option<DeleteLogRow>>;

    /// Stamp an entry restored. Returns false if it was already restored.
    async fn mark_entry_restored(
        &self,
        conn: &mut SqliteConnection,
        entry_id: LogEntryId,
        restored_by_id: ActorId,
        restored_at: OffsetDateTime,
    ) -> SoftDeleteResult<bool>;

    /// Count entries of a transaction that are not yet restored.
    async fn count_outstanding(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<u64>;

    /// Count entries of all transactions that are not yet restored.
    async fn count_all_outstanding(&self, conn: &mut SqliteConnection) -> SoftDeleteResult<u64>;

    /// Outstanding entries of a transaction, ordered by entry id ascending.
    async fn outstanding_entries(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<Vec<DeleteLogRow>>;

    /// Outstanding entry counts of a transaction grouped by entity type.
    async fn outstanding_grouped_by_type(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<Vec<TypeCount>>;

    /// All entries of a transaction, restored or not, ordered by entry id.
    async fn entries_for_transaction(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<Vec<DeleteLogRow>>;

    /// Delete every log entry. Returns the number of rows removed.
    async fn truncate_log(&self, conn: &mut SqliteConnection) -> SoftDeleteResult<u64>;
}
