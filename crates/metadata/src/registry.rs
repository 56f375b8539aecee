//! Typed registry of restorable entity types.
//!
//! The deletion log stores a type identifier per entry. Bulk restore looks the
//! identifier up here to find the code that can restore it; an identifier with
//! no registered handler means the log cannot be trusted for that batch.

use crate::coordinator::Coordinator;
use crate::entity::{EntityTable, SoftDeletable};
use crate::error::{SoftDeleteError, SoftDeleteResult};
use crate::hooks::RestoreEvent;
use async_trait::async_trait;
use reclaim_core::config::{EntityTableConfig, SoftDeleteConfig};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqliteConnection, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Restores and loads logged entities of one type.
#[async_trait]
pub trait RestoreHandler: Send + Sync {
    /// Type identifier this handler is registered under.
    fn entity_type(&self) -> &str;

    /// Restore one logged entity inside the caller's store transaction.
    ///
    /// Runs the same per-entity path as a single restore; the returned event is
    /// handed to observers once the enclosing transaction settles.
    async fn restore_logged(
        &self,
        coordinator: &mut Coordinator,
        conn: &mut SqliteConnection,
        entity_id: &str,
    ) -> SoftDeleteResult<RestoreEvent>;

    /// Load the current row, deleted or not, as JSON.
    async fn load_json(
        &self,
        conn: &mut SqliteConnection,
        config: &SoftDeleteConfig,
        entity_id: &str,
    ) -> SoftDeleteResult<Option<serde_json::Value>>;
}

/// Handler for a Rust entity type.
struct TypedHandler<E>(PhantomData<fn() -> E>);

impl<E: SoftDeletable> TypedHandler<E> {
    fn parse_id(entity_id: &str) -> SoftDeleteResult<E::Id> {
        entity_id.parse().map_err(|_| {
            SoftDeleteError::Integrity(format!(
                "logged id '{entity_id}' is not a valid {} key",
                E::ENTITY_TYPE
            ))
        })
    }
}

#[async_trait]
impl<E> RestoreHandler for TypedHandler<E>
where
    E: SoftDeletable + Serialize,
{
    fn entity_type(&self) -> &str {
        E::ENTITY_TYPE
    }

    async fn restore_logged(
        &self,
        coordinator: &mut Coordinator,
        conn: &mut SqliteConnection,
        entity_id: &str,
    ) -> SoftDeleteResult<RestoreEvent> {
        let id = Self::parse_id(entity_id)?;
        let table = EntityTable::of::<E>(coordinator.config())?;
        let mut entity: E = table
            .find_with_deleted(&mut *conn, &id)
            .await?
            .ok_or_else(|| {
                SoftDeleteError::Integrity(format!(
                    "logged {} {entity_id} no longer exists",
                    E::ENTITY_TYPE
                ))
            })?;
        coordinator.restore_entity_in(conn, &mut entity).await
    }

    async fn load_json(
        &self,
        conn: &mut SqliteConnection,
        config: &SoftDeleteConfig,
        entity_id: &str,
    ) -> SoftDeleteResult<Option<serde_json::Value>> {
        let id = match Self::parse_id(entity_id) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    entity_type = E::ENTITY_TYPE,
                    entity_id = entity_id,
                    error = %e,
                    "Skipping hydration of unparseable logged id"
                );
                return Ok(None);
            }
        };
        let table = EntityTable::of::<E>(config)?;
        let entity: Option<E> = table.find_with_deleted(conn, &id).await?;
        entity
            .map(|e| serde_json::to_value(&e))
            .transpose()
            .map_err(SoftDeleteError::from)
    }
}

/// Handler for a plain table declared in configuration.
struct TableHandler {
    entity_type: String,
    table: EntityTable,
}

#[async_trait]
impl RestoreHandler for TableHandler {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    async fn restore_logged(
        &self,
        coordinator: &mut Coordinator,
        conn: &mut SqliteConnection,
        entity_id: &str,
    ) -> SoftDeleteResult<RestoreEvent> {
        let key = entity_id.to_string();
        let transaction_id = match self.table.read_marker(&mut *conn, &key).await? {
            Some(Some(transaction_id)) => transaction_id,
            Some(None) => {
                return Err(SoftDeleteError::NotFound(format!(
                    "{} {key} is not deleted",
                    self.entity_type
                )));
            }
            None => {
                return Err(SoftDeleteError::Integrity(format!(
                    "logged {} {key} no longer exists",
                    self.entity_type
                )));
            }
        };

        let event = RestoreEvent::new(&self.entity_type, &key, Some(transaction_id));
        coordinator
            .restore_row_in(conn, &event, &self.table, &key)
            .await?;
        Ok(event)
    }

    async fn load_json(
        &self,
        conn: &mut SqliteConnection,
        _config: &SoftDeleteConfig,
        entity_id: &str,
    ) -> SoftDeleteResult<Option<serde_json::Value>> {
        let row = self.table.find_raw(conn, &entity_id.to_string()).await?;
        row.as_ref().map(row_to_json).transpose()
    }
}

/// Convert a row of unknown shape to a JSON object keyed by column name.
fn row_to_json(row: &SqliteRow) -> SoftDeleteResult<serde_json::Value> {
    let mut object = serde_json::Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            serde_json::Value::Null
        } else {
            // SQLite values carry their storage class, not the declared column type.
            match raw.type_info().name() {
                "INTEGER" => serde_json::Value::from(row.try_get::<i64, _>(index)?),
                "REAL" => serde_json::Value::from(row.try_get::<f64, _>(index)?),
                "BLOB" => serde_json::Value::from(row.try_get::<Vec<u8>, _>(index)?),
                _ => serde_json::Value::from(row.try_get::<String, _>(index)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(serde_json::Value::Object(object))
}

/// Map from logged type identifier to its restore handler.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    handlers: HashMap<String, Arc<dyn RestoreHandler>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Rust entity type under its `ENTITY_TYPE`.
    pub fn register<E>(&mut self) -> SoftDeleteResult<()>
    where
        E: SoftDeletable + Serialize,
    {
        // Reject unusable table layouts at startup rather than mid-restore.
        EntityTable::of::<E>(&SoftDeleteConfig::default())?;
        self.register_handler(Arc::new(TypedHandler::<E>(PhantomData)))
    }

    /// Register a plain table declared in configuration.
    pub fn register_table(
        &mut self,
        entity: &EntityTableConfig,
        config: &SoftDeleteConfig,
    ) -> SoftDeleteResult<()> {
        self.register_handler(Arc::new(TableHandler {
            entity_type: entity.entity_type.clone(),
            table: EntityTable::from_config(entity, config),
        }))
    }

    /// Register a custom handler.
    pub fn register_handler(&mut self, handler: Arc<dyn RestoreHandler>) -> SoftDeleteResult<()> {
        let entity_type = handler.entity_type().to_string();
        if self.handlers.contains_key(&entity_type) {
            return Err(SoftDeleteError::Config(format!(
                "entity type '{entity_type}' is already registered"
            )));
        }
        self.handlers.insert(entity_type, handler);
        Ok(())
    }

    /// Look up the handler for a logged type identifier.
    pub fn get(&self, entity_type: &str) -> Option<Arc<dyn RestoreHandler>> {
        self.handlers.get(entity_type).cloned()
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.handlers.contains_key(entity_type)
    }

    /// Registered type identifiers, sorted.
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entity_types", &self.entity_types())
            .finish()
    }
}
