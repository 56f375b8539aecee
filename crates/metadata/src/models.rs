//! Database models mapping to the delete log schema.

use reclaim_core::{ActorId, LogEntryId, TransactionId};
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// One logical batch of deletions.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct DeleteTransactionRow {
    pub id: TransactionId,
    pub deleted_by_id: ActorId,
    #[serde(with = "time::serde::rfc3339")]
    pub deleted_at: OffsetDateTime,
    /// Set together with `restored_by_id` once no log entry is outstanding.
    #[serde(with = "time::serde::rfc3339::option")]
    pub restored_at: Option<OffsetDateTime>,
    pub restored_by_id: Option<ActorId>,
}

impl DeleteTransactionRow {
    /// Whether every entity deleted under this transaction has been restored.
    pub fn is_restored(&self) -> bool {
        self.restored_at.is_some()
    }
}

/// One deleted entity.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct DeleteLogRow {
    pub id: LogEntryId,
    pub delete_transaction_id: TransactionId,
    /// Registered entity type identifier.
    pub model_class: String,
    /// Primary key of the deleted row, rendered as text.
    pub row_id: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub restored_at: Option<OffsetDateTime>,
    pub restored_by_id: Option<ActorId>,
}

impl DeleteLogRow {
    /// Whether this entry still awaits restore.
    pub fn is_outstanding(&self) -> bool {
        self.restored_at.is_none()
    }
}

/// Outstanding entry count for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct TypeCount {
    pub model_class: String,
    pub outstanding: i64,
}

/// Which transactions a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionFilter {
    #[default]
    All,
    /// Transactions not yet fully restored.
    Open,
    /// Fully restored transactions.
    Restored,
}

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub transactions: u64,
    pub log_entries: u64,
}
