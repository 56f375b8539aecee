//! Delete log store trait and the SQLite implementation.

use crate::error::{SoftDeleteError, SoftDeleteResult};
use crate::repos::{DeletionLogRepo, TransactionRepo};
use crate::schema::Statements;
use async_trait::async_trait;
use reclaim_core::config::SchemaConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined delete log store trait.
#[async_trait]
pub trait LogStore: TransactionRepo + DeletionLogRepo + Send + Sync {
    /// Create the log tables if they do not exist.
    async fn migrate(&self) -> SoftDeleteResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> SoftDeleteResult<()>;
}

/// SQLite-backed delete log store.
///
/// Soft-deletable entity tables live in the same database, so a single store
/// transaction covers both the log entry and the entity's marker.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    statements: Statements,
    #[allow(dead_code)] // Advisory only, SQLite cannot cancel a running statement
    query_timeout_secs: u64,
}

impl SqliteStore {
    /// Open (or create) a SQLite database and ensure the log tables exist.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
        schema: &SchemaConfig,
    ) -> SoftDeleteResult<Self> {
        schema.validate().map_err(SoftDeleteError::Config)?;

        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600); // 10 minutes default

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits one writer at a time; a single connection serializes
            // store transactions instead of failing them with "database is locked".
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            statements: Statements::new(schema),
            query_timeout_secs,
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = query_timeout_secs,
            "SQLite delete log store opened"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Begin a store transaction.
    ///
    /// The returned transaction rolls back when dropped without a commit.
    pub async fn begin(&self) -> SoftDeleteResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(SoftDeleteError::TransactionOpen)
    }
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn migrate(&self) -> SoftDeleteResult<()> {
        sqlx::query(&self.statements.create_schema)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> SoftDeleteResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use reclaim_core::{ActorId, LogEntryId, TransactionId};
    use sqlx::SqliteConnection;
    use time::OffsetDateTime;

    #[async_trait]
    impl TransactionRepo for SqliteStore {
        async fn insert_transaction(
            &self,
            conn: &mut SqliteConnection,
            deleted_by_id: ActorId,
            deleted_at: OffsetDateTime,
        ) -> SoftDeleteResult<TransactionId> {
            let result = sqlx::query(&self.statements.insert_transaction)
                .bind(deleted_by_id)
                .bind(deleted_at)
                .execute(&mut *conn)
                .await
                .map_err(|e| SoftDeleteError::LogWrite(format!("create delete transaction: {e}")))?;
            Ok(TransactionId::new(result.last_insert_rowid()))
        }

        async fn get_transaction(
            &self,
            conn: &mut SqliteConnection,
            transaction_id: TransactionId,
        ) -> SoftDeleteResult<Option<DeleteTransactionRow>> {
            let row = sqlx::query_as::<_, DeleteTransactionRow>(&self.statements.select_transaction)
                .bind(transaction_id)
                .fetch_optional(&mut *conn)
                .await?;
            Ok(row)
        }

        async fn list_transactions(
            &self,
            conn: &mut SqliteConnection,
            filter: TransactionFilter,
            limit: u32,
        ) -> SoftDeleteResult<Vec<DeleteTransactionRow>> {
            let sql = match filter {
                TransactionFilter::All => &self.statements.list_transactions_all,
                TransactionFilter::Open => &self.statements.list_transactions_open,
                TransactionFilter::Restored => &self.statements.list_transactions_restored,
            };
            let rows = sqlx::query_as::<_, DeleteTransactionRow>(sql)
                .bind(limit)
                .fetch_all(&mut *conn)
                .await?;
            Ok(rows)
        }

        async fn mark_transaction_restored(
            &self,
            conn: &mut SqliteConnection,
            transaction_id: TransactionId,
            restored_by_id: ActorId,
            restored_at: OffsetDateTime,
        ) -> SoftDeleteResult<bool> {
            let result = sqlx::query(&self.statements.mark_transaction_restored)
                .bind(restored_at)
                .bind(restored_by_id)
                .bind(transaction_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    SoftDeleteError::LogWrite(format!(
                        "mark transaction {transaction_id} restored: {e}"
                    ))
                })?;
            Ok(result.rows_affected() > 0)
        }

        async fn truncate_transactions(
            &self,
            conn: &mut SqliteConnection,
        ) -> SoftDeleteResult<u64> {
            let result = sqlx::query(&self.statements.truncate_transactions)
                .execute(&mut *conn)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl DeletionLogRepo for SqliteStore {
        async fn insert_log_entry(
            &self,
            conn: &mut SqliteConnection,
            transaction_id: TransactionId,
            model_class: &str,
            row_id: &str,
        ) -> SoftDeleteResult<Option<LogEntryId>> {
            let result = sqlx::query(&self.statements.insert_log_entry)
                .bind(transaction_id)
                .bind(model_class)
                .bind(row_id)
                .bind(transaction_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    SoftDeleteError::LogWrite(format!(
                        "insert log entry for {model_class} {row_id}: {e}"
                    ))
                })?;
            if result.rows_affected() == 0 {
                return Ok(None);
            }
            Ok(Some(LogEntryId::new(result.last_insert_rowid())))
        }

        async fn find_outstanding_entry(
            &self,
            conn: &mut SqliteConnection,
            model_class: &str,
            row_id: &str,
        ) -> SoftDeleteResult<Option<DeleteLogRow>> {
            let mut rows =
                sqlx::query_as::<_, DeleteLogRow>(&self.statements.select_outstanding_for_entity)
                    .bind(model_class)
                    .bind(row_id)
                    .fetch_all(&mut *conn)
                    .await?;

            if rows.len() > 1 {
                return Err(SoftDeleteError::Integrity(format!(
                    "{} outstanding log entries for {model_class} {row_id}",
                    rows.len()
                )));
            }
            Ok(rows.pop())
        }

        async fn mark_entry_restored(
            &self,
            conn: &mut SqliteConnection,
            entry_id: LogEntryId,
            restored_by_id: ActorId,
            restored_at: OffsetDateTime,
        ) -> SoftDeleteResult<bool> {
            let result = sqlx::query(&self.statements.mark_entry_restored)
                .bind(restored_at)
                .bind(restored_by_id)
                .bind(entry_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    SoftDeleteError::LogWrite(format!("mark log entry {entry_id} restored: {e}"))
                })?;
            Ok(result.rows_affected() > 0)
        }

        async fn count_outstanding(
            &self,
            conn: &mut SqliteConnection,
            transaction_id: TransactionId,
        ) -> SoftDeleteResult<u64> {
            let count: i64 = sqlx::query_scalar(&self.statements.count_outstanding)
                .bind(transaction_id)
                .fetch_one(&mut *conn)
                .await?;
            Ok(count as u64)
        }

        async fn count_all_outstanding(
            &self,
            conn: &mut SqliteConnection,
        ) -> SoftDeleteResult<u64> {
            let count: i64 = sqlx::query_scalar(&self.statements.count_all_outstanding)
                .fetch_one(&mut *conn)
                .await?;
            Ok(count as u64)
        }

        async fn outstanding_entries(
            &self,
            conn: &mut SqliteConnection,
            transaction_id: TransactionId,
        ) -> SoftDeleteResult<Vec<DeleteLogRow>> {
            let rows =
                sqlx::query_as::<_, DeleteLogRow>(&self.statements.select_outstanding_entries)
                    .bind(transaction_id)
                    .fetch_all(&mut *conn)
                    .await?;
            Ok(rows)
        }

        async fn outstanding_grouped_by_type(
            &self,
            conn: &mut SqliteConnection,
            transaction_id: TransactionId,
        ) -> SoftDeleteResult<Vec<TypeCount>> {
            let rows = sqlx::query_as::<_, TypeCount>(&self.statements.select_outstanding_grouped)
                .bind(transaction_id)
                .fetch_all(&mut *conn)
                .await?;
            Ok(rows)
        }

        async fn entries_for_transaction(
            &self,
            conn: &mut SqliteConnection,
            transaction_id: TransactionId,
        ) -> SoftDeleteResult<Vec<DeleteLogRow>> {
            let rows = sqlx::query_as::<_, DeleteLogRow>(&self.statements.select_entries)
                .bind(transaction_id)
                .fetch_all(&mut *conn)
                .await?;
            Ok(rows)
        }

        async fn truncate_log(&self, conn: &mut SqliteConnection) -> SoftDeleteResult<u64> {
            let result = sqlx::query(&self.statements.truncate_log)
                .execute(&mut *conn)
                .await?;
            Ok(result.rows_affected())
        }
    }
}
