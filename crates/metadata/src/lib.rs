//! Transactional, bulk-recoverable soft deletes.
//!
//! This crate provides:
//! - The delete transaction and deletion log tables and their repositories
//! - The soft-deletable entity contract and deleted-row query filtering
//! - The [`Coordinator`], which keeps entity markers and the log in step
//! - Bulk restore of a whole delete transaction through a type registry

pub mod coordinator;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod models;
pub mod query;
pub mod registry;
pub mod repos;
pub mod schema;
pub mod store;

pub use coordinator::{
    BulkRestoreReport, Coordinator, OutstandingItem, SoftDeletes, SoftDeletesBuilder,
};
pub use entity::{EntityKey, EntityTable, SoftDeletable};
pub use error::{SoftDeleteError, SoftDeleteResult};
pub use hooks::{RestoreEvent, RestoreObserver, RestoreOutcome};
pub use query::{DeletedFilter, FilterValue, SoftDeleteQuery};
pub use registry::{EntityRegistry, RestoreHandler};
pub use store::{LogStore, SqliteStore};

use reclaim_core::config::{AppConfig, MetadataConfig, SoftDeleteConfig};
use std::sync::Arc;

/// Open the delete log store described by configuration.
pub async fn open_store(
    metadata: &MetadataConfig,
    soft_deletes: &SoftDeleteConfig,
) -> SoftDeleteResult<Arc<SqliteStore>> {
    match metadata {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs, &soft_deletes.schema).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the soft delete service from application configuration.
///
/// Tables listed under `entities` are registered for bulk restore. Rust entity
/// types and observers are added through [`SoftDeletes::builder`] instead.
pub async fn from_config(config: &AppConfig) -> SoftDeleteResult<SoftDeletes> {
    config.validate().map_err(SoftDeleteError::Config)?;
    let store = open_store(&config.metadata, &config.soft_deletes).await?;

    config
        .entities
        .iter()
        .cloned()
        .fold(
            SoftDeletes::builder(store).config(config.soft_deletes.clone()),
            SoftDeletesBuilder::register_table,
        )
        .build()
}
