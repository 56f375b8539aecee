//! Delete transaction repository trait.

use crate::error::SoftDeleteResult;
use crate::models::{DeleteTransactionRow, TransactionFilter};
use async_trait::async_trait;
use reclaim_core::{ActorId, TransactionId};
use sqlx::SqliteConnection;
use time::OffsetDateTime;

/// Repository for delete transaction records.
#[async_trait]
pub trait TransactionRepo: Send + Sync {
    /// Create a transaction record and return its store-assigned id.
    async fn insert_transaction(
        &self,
        conn: &mut SqliteConnection,
        deleted_by_id: ActorId,
        deleted_at: OffsetDateTime,
    ) -> SoftDeleteResult<TransactionId>;

    /// Get a transaction record by id.
    async fn get_transaction(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<Option<DeleteTransactionRow>>;

    /// List transactions, newest first.
    async fn list_transactions(
        &self,
        conn: &mut SqliteConnection,
        filter: TransactionFilter,
        limit: u32,
    ) -> SoftDeleteResult<Vec<DeleteTransactionRow>>;

    /// Stamp a transaction restored.
    ///
    /// Returns false when the transaction does not exist or is already restored;
    /// an existing restore stamp is never overwritten.
    async fn mark_transaction_restored(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
        restored_by_id: ActorId,
        restored_at: OffsetDateTime,
    ) -> SoftDeleteResult<bool>;

    /// Delete every transaction record. Returns the number of rows removed.
    async fn truncate_transactions(&self, conn: &mut SqliteConnection) -> SoftDeleteResult<u64>;
}
