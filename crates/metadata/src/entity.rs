//! The soft-deletable entity contract.
//!
//! An entity participates in transactional soft deletes by carrying a nullable
//! deletion marker column. A null marker means the row is live; a non-null
//! marker is the id of the delete transaction the row was deleted under. The
//! marker is only ever written through the [`Coordinator`](crate::Coordinator).

use crate::error::{SoftDeleteError, SoftDeleteResult};
use reclaim_core::config::{EntityTableConfig, SoftDeleteConfig};
use reclaim_core::{Ident, TransactionId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Encode, FromRow, Sqlite, SqliteConnection, Type};
use std::fmt;
use std::str::FromStr;

/// Primary key of a soft-deletable entity.
///
/// The key is logged as its `Display` text and parsed back with `FromStr`
/// during bulk restore, so the two must round-trip.
pub trait EntityKey:
    Clone + fmt::Display + FromStr + Send + Sync + 'static + for<'q> Encode<'q, Sqlite> + Type<Sqlite>
{
}

impl<T> EntityKey for T where
    T: Clone
        + fmt::Display
        + FromStr
        + Send
        + Sync
        + 'static
        + for<'q> Encode<'q, Sqlite>
        + Type<Sqlite>
{
}

/// An entity type whose rows can be soft deleted and restored.
pub trait SoftDeletable: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin + 'static {
    /// Primary key type.
    type Id: EntityKey;

    /// Stable type identifier written to the log.
    const ENTITY_TYPE: &'static str;

    /// Table holding the entity rows.
    const TABLE: &'static str;

    /// Primary key column.
    const ID_COLUMN: &'static str = "id";

    /// Deletion marker column; `None` uses the configured default.
    const MARKER_COLUMN: Option<&'static str> = None;

    /// Primary key of this row.
    fn entity_id(&self) -> Self::Id;

    /// Current deletion marker.
    fn deletion_marker(&self) -> Option<TransactionId>;

    /// Replace the in-memory deletion marker.
    fn set_deletion_marker(&mut self, marker: Option<TransactionId>);

    /// Whether this row is soft deleted.
    fn is_deleted(&self) -> bool {
        self.deletion_marker().is_some()
    }
}

/// Validated table layout of a soft-deletable entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTable {
    pub table: Ident,
    pub id_column: Ident,
    pub marker_column: Ident,
}

impl EntityTable {
    /// Layout of a Rust entity type.
    pub fn of<E: SoftDeletable>(config: &SoftDeleteConfig) -> SoftDeleteResult<Self> {
        let marker_column = match E::MARKER_COLUMN {
            Some(column) => Ident::new(column)?,
            None => config.marker_column.clone(),
        };
        Ok(Self {
            table: Ident::new(E::TABLE)?,
            id_column: Ident::new(E::ID_COLUMN)?,
            marker_column,
        })
    }

    /// Layout of a table declared in configuration.
    pub fn from_config(entity: &EntityTableConfig, config: &SoftDeleteConfig) -> Self {
        Self {
            table: entity.table.clone(),
            id_column: entity.id_column.clone(),
            marker_column: entity
                .marker_column
                .clone()
                .unwrap_or_else(|| config.marker_column.clone()),
        }
    }

    /// Load a row by primary key, whether or not it is deleted.
    pub async fn find_with_deleted<E, K>(
        &self,
        conn: &mut SqliteConnection,
        id: &K,
    ) -> SoftDeleteResult<Option<E>>
    where
        E: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        K: EntityKey,
    {
        let sql = format!("SELECT * FROM {} WHERE {} = ?", self.table, self.id_column);
        let row = sqlx::query_as::<_, E>(&sql)
            .bind(id.clone())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Load a row by primary key as a raw SQLite row.
    pub async fn find_raw<K: EntityKey>(
        &self,
        conn: &mut SqliteConnection,
        id: &K,
    ) -> SoftDeleteResult<Option<SqliteRow>> {
        let sql = format!("SELECT * FROM {} WHERE {} = ?", self.table, self.id_column);
        let row = sqlx::query(&sql)
            .bind(id.clone())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Read the stored marker. `None` means the row does not exist.
    pub async fn read_marker<K: EntityKey>(
        &self,
        conn: &mut SqliteConnection,
        id: &K,
    ) -> SoftDeleteResult<Option<Option<TransactionId>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.marker_column, self.table, self.id_column
        );
        let marker: Option<Option<TransactionId>> = sqlx::query_scalar(&sql)
            .bind(id.clone())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(marker)
    }

    /// Stamp a live row with a transaction id.
    pub async fn stamp_marker<K: EntityKey>(
        &self,
        conn: &mut SqliteConnection,
        id: &K,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<()> {
        let sql = format!(
            "UPDATE {table} SET {marker} = ? WHERE {id_col} = ? AND {marker} IS NULL",
            table = self.table,
            marker = self.marker_column,
            id_col = self.id_column,
        );
        let result = sqlx::query(&sql)
            .bind(transaction_id)
            .bind(id.clone())
            .execute(&mut *conn)
            .await
            .map_err(|e| SoftDeleteError::MarkerWrite(format!("{} {id}: {e}", self.table)))?;

        if result.rows_affected() == 0 {
            return Err(SoftDeleteError::MarkerWrite(format!(
                "{} {id} is missing or already deleted",
                self.table
            )));
        }
        Ok(())
    }

    /// Clear the marker of a row deleted under `transaction_id`.
    pub async fn clear_marker<K: EntityKey>(
        &self,
        conn: &mut SqliteConnection,
        id: &K,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<()> {
        let sql = format!(
            "UPDATE {table} SET {marker} = NULL WHERE {id_col} = ? AND {marker} = ?",
            table = self.table,
            marker = self.marker_column,
            id_col = self.id_column,
        );
        let result = sqlx::query(&sql)
            .bind(id.clone())
            .bind(transaction_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| SoftDeleteError::MarkerWrite(format!("{} {id}: {e}", self.table)))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing matched; report why.
        match self.read_marker(conn, id).await? {
            None => Err(SoftDeleteError::MarkerWrite(format!(
                "{} {id} does not exist",
                self.table
            ))),
            Some(None) => Err(SoftDeleteError::NotFound(format!(
                "{} {id} is not deleted",
                self.table
            ))),
            Some(Some(other)) => Err(SoftDeleteError::Integrity(format!(
                "{} {id} is marked with transaction {other}, expected {transaction_id}",
                self.table
            ))),
        }
    }

    /// Physically remove a row.
    pub async fn hard_delete<K: EntityKey>(
        &self,
        conn: &mut SqliteConnection,
        id: &K,
    ) -> SoftDeleteResult<bool> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", self.table, self.id_column);
        let result = sqlx::query(&sql)
            .bind(id.clone())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
