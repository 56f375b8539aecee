//! Configuration types shared across crates.

use crate::ident::Ident;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// How restore and delete timestamps are minted within one batch.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// Mint one timestamp per batch and reuse it for every operation (default).
    #[default]
    Reuse,
    /// Mint a fresh timestamp on every call.
    Fresh,
}

/// Table and column names of the delete transaction and deletion log tables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaConfig {
    /// Table holding one row per delete transaction.
    #[serde(default = "default_transaction_table")]
    pub transaction_table: Ident,
    /// Table holding one row per deleted entity.
    #[serde(default = "default_log_table")]
    pub log_table: Ident,
    /// Primary key column of both tables.
    #[serde(default = "default_column_id")]
    pub column_id: Ident,
    /// Log column referencing the owning transaction.
    #[serde(default = "default_column_delete_transaction_id")]
    pub column_delete_transaction_id: Ident,
    #[serde(default = "default_column_deleted_at")]
    pub column_deleted_at: Ident,
    #[serde(default = "default_column_deleted_by_id")]
    pub column_deleted_by_id: Ident,
    #[serde(default = "default_column_restored_at")]
    pub column_restored_at: Ident,
    #[serde(default = "default_column_restored_by_id")]
    pub column_restored_by_id: Ident,
    /// Log column holding the deleted entity's primary key.
    #[serde(default = "default_column_row_id")]
    pub column_row_id: Ident,
    /// Log column holding the deleted entity's type identifier.
    #[serde(default = "default_column_model_class")]
    pub column_model_class: Ident,
}

fn default_transaction_table() -> Ident {
    Ident::from_static("delete_transaction")
}

fn default_log_table() -> Ident {
    Ident::from_static("delete_transaction_log")
}

fn default_column_id() -> Ident {
    Ident::from_static("id")
}

fn default_column_delete_transaction_id() -> Ident {
    Ident::from_static("delete_transaction_id")
}

fn default_column_deleted_at() -> Ident {
    Ident::from_static("deleted_at")
}

fn default_column_deleted_by_id() -> Ident {
    Ident::from_static("deleted_by_id")
}

fn default_column_restored_at() -> Ident {
    Ident::from_static("restored_at")
}

fn default_column_restored_by_id() -> Ident {
    Ident::from_static("restored_by_id")
}

fn default_column_row_id() -> Ident {
    Ident::from_static("row_id")
}

fn default_column_model_class() -> Ident {
    Ident::from_static("model_class")
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            transaction_table: default_transaction_table(),
            log_table: default_log_table(),
            column_id: default_column_id(),
            column_delete_transaction_id: default_column_delete_transaction_id(),
            column_deleted_at: default_column_deleted_at(),
            column_deleted_by_id: default_column_deleted_by_id(),
            column_restored_at: default_column_restored_at(),
            column_restored_by_id: default_column_restored_by_id(),
            column_row_id: default_column_row_id(),
            column_model_class: default_column_model_class(),
        }
    }
}

impl SchemaConfig {
    /// Validate schema naming invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.transaction_table == self.log_table {
            return Err(format!(
                "schema.transaction_table and schema.log_table must differ (both '{}')",
                self.log_table
            ));
        }

        let transaction_columns = [
            &self.column_id,
            &self.column_deleted_at,
            &self.column_deleted_by_id,
            &self.column_restored_at,
            &self.column_restored_by_id,
        ];
        let log_columns = [
            &self.column_id,
            &self.column_delete_transaction_id,
            &self.column_model_class,
            &self.column_row_id,
            &self.column_restored_at,
            &self.column_restored_by_id,
        ];
        for (table, columns) in [
            (&self.transaction_table, &transaction_columns[..]),
            (&self.log_table, &log_columns[..]),
        ] {
            let mut seen = HashSet::new();
            for column in columns {
                if !seen.insert(column.as_str()) {
                    return Err(format!("column '{column}' is used twice in table '{table}'"));
                }
            }
        }
        Ok(())
    }
}

/// Soft delete coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftDeleteConfig {
    /// Default deletion marker column for entities that do not name their own.
    #[serde(default = "default_marker_column")]
    pub marker_column: Ident,
    /// Whether timestamps are frozen per batch or minted per call.
    #[serde(default)]
    pub timestamp_mode: TimestampMode,
    /// Upper bound on a bulk transaction restore, in seconds.
    #[serde(default = "default_restore_timeout_secs")]
    pub restore_timeout_secs: u64,
    /// Fixed actor id for processes without a per-request user.
    /// When unset and no provider is injected, the unknown-actor sentinel is recorded.
    #[serde(default)]
    pub actor_id: Option<i64>,
    /// Log table naming.
    #[serde(default)]
    pub schema: SchemaConfig,
}

fn default_marker_column() -> Ident {
    Ident::from_static(crate::DEFAULT_MARKER_COLUMN)
}

fn default_restore_timeout_secs() -> u64 {
    300 // 5 minutes
}

impl Default for SoftDeleteConfig {
    fn default() -> Self {
        Self {
            marker_column: default_marker_column(),
            timestamp_mode: TimestampMode::default(),
            restore_timeout_secs: default_restore_timeout_secs(),
            actor_id: None,
            schema: SchemaConfig::default(),
        }
    }
}

impl SoftDeleteConfig {
    /// Get the bulk restore timeout as a Duration.
    pub fn restore_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.restore_timeout_secs)
    }

    /// Validate coordinator configuration.
    pub fn validate(&self) -> Result<(), String> {
        // tokio::time::timeout with a zero duration fails every bulk restore immediately
        if self.restore_timeout_secs == 0 {
            return Err("soft_deletes.restore_timeout_secs cannot be 0".to_string());
        }
        self.schema.validate()
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600) // 10 minutes (advisory only)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/reclaim.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// A plain table registered for restore without a Rust entity type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityTableConfig {
    /// Type identifier as written to the log's model class column.
    pub entity_type: String,
    /// Table holding the entity rows.
    pub table: Ident,
    /// Primary key column.
    #[serde(default = "default_entity_id_column")]
    pub id_column: Ident,
    /// Deletion marker column (defaults to `soft_deletes.marker_column`).
    #[serde(default)]
    pub marker_column: Option<Ident>,
}

fn default_entity_id_column() -> Ident {
    Ident::from_static("id")
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Soft delete coordinator configuration.
    #[serde(default)]
    pub soft_deletes: SoftDeleteConfig,
    /// Tables whose rows can be restored by type name.
    #[serde(default)]
    pub entities: Vec<EntityTableConfig>,
}

impl AppConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.soft_deletes.validate()?;

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if entity.entity_type.trim().is_empty() {
                return Err(format!(
                    "entities: entity_type cannot be empty (table '{}')",
                    entity.table
                ));
            }
            if !seen.insert(entity.entity_type.as_str()) {
                return Err(format!(
                    "entities: entity_type '{}' is declared more than once",
                    entity.entity_type
                ));
            }
        }
        Ok(())
    }
}
