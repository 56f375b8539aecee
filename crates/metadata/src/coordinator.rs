//! The transaction coordinator.
//!
//! [`SoftDeletes`] is the long-lived service: store, configuration, actor
//! provider, entity registry and observers. [`Coordinator`] is a short-lived
//! handle created per request or batch; it caches the current delete
//! transaction id and timestamp so that a burst of deletes shares one
//! transaction. Handles are never shared between concurrent operations.

use crate::entity::{EntityKey, EntityTable, SoftDeletable};
use crate::error::{SoftDeleteError, SoftDeleteResult};
use crate::hooks::{RestoreEvent, RestoreObserver, RestoreObservers, RestoreOutcome};
use crate::models::{
    DeleteLogRow, DeleteTransactionRow, PurgeStats, TransactionFilter, TypeCount,
};
use crate::registry::EntityRegistry;
use crate::repos::{DeletionLogRepo, TransactionRepo};
use crate::store::SqliteStore;
use reclaim_core::config::{EntityTableConfig, SoftDeleteConfig, TimestampMode};
use reclaim_core::{ActorId, ActorProvider, LogEntryId, SharedActorProvider, TransactionId};
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;

struct Shared {
    store: Arc<SqliteStore>,
    config: SoftDeleteConfig,
    actor: SharedActorProvider,
    registry: EntityRegistry,
    observers: RestoreObservers,
}

/// Process-wide soft delete service.
#[derive(Clone)]
pub struct SoftDeletes {
    shared: Arc<Shared>,
}

impl SoftDeletes {
    /// Start building a service over a store.
    pub fn builder(store: Arc<SqliteStore>) -> SoftDeletesBuilder {
        SoftDeletesBuilder {
            store,
            config: SoftDeleteConfig::default(),
            actor: None,
            registry: EntityRegistry::new(),
            observers: RestoreObservers::new(),
            tables: Vec::new(),
        }
    }

    /// Create a handle with an empty transaction cache.
    pub fn coordinator(&self) -> Coordinator {
        Coordinator {
            service: self.clone(),
            batch: BatchState::default(),
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.shared.store
    }

    pub fn config(&self) -> &SoftDeleteConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.shared.registry
    }

    /// Resolve the actor for the operation in progress.
    pub fn current_actor(&self) -> ActorId {
        self.shared.actor.current_actor()
    }
}

impl std::fmt::Debug for SoftDeletes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftDeletes")
            .field("config", &self.shared.config)
            .field("registry", &self.shared.registry)
            .field("observers", &self.shared.observers)
            .finish()
    }
}

/// Builder for [`SoftDeletes`].
pub struct SoftDeletesBuilder {
    store: Arc<SqliteStore>,
    config: SoftDeleteConfig,
    actor: Option<SharedActorProvider>,
    registry: EntityRegistry,
    observers: RestoreObservers,
    tables: Vec<EntityTableConfig>,
}

impl SoftDeletesBuilder {
    pub fn config(mut self, config: SoftDeleteConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject the provider of the current actor id.
    ///
    /// Without one, `config.actor_id` is used, falling back to
    /// [`UNKNOWN_ACTOR_ID`](reclaim_core::UNKNOWN_ACTOR_ID).
    pub fn actor_provider(mut self, provider: impl ActorProvider + 'static) -> Self {
        self.actor = Some(SharedActorProvider::new(provider));
        self
    }

    /// Register a Rust entity type for bulk restore.
    pub fn register<E>(mut self) -> SoftDeleteResult<Self>
    where
        E: SoftDeletable + Serialize,
    {
        self.registry.register::<E>()?;
        Ok(self)
    }

    /// Register a configured table for bulk restore.
    pub fn register_table(mut self, entity: EntityTableConfig) -> Self {
        self.tables.push(entity);
        self
    }

    /// Observe restores of every entity type.
    pub fn observer(mut self, observer: Arc<dyn RestoreObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    /// Observe restores of one entity type.
    pub fn observer_for(
        mut self,
        entity_type: impl Into<String>,
        observer: Arc<dyn RestoreObserver>,
    ) -> Self {
        self.observers.add_for(entity_type, observer);
        self
    }

    pub fn build(mut self) -> SoftDeleteResult<SoftDeletes> {
        self.config.validate().map_err(SoftDeleteError::Config)?;

        // Table handlers resolve their marker column against the final config.
        for entity in &self.tables {
            self.registry.register_table(entity, &self.config)?;
        }

        let actor = self
            .actor
            .unwrap_or_else(|| SharedActorProvider::from_config(self.config.actor_id));

        Ok(SoftDeletes {
            shared: Arc::new(Shared {
                store: self.store,
                config: self.config,
                actor,
                registry: self.registry,
                observers: self.observers,
            }),
        })
    }
}

/// Per-handle cache of the current delete transaction.
#[derive(Debug, Clone, Default)]
struct BatchState {
    transaction_id: Option<TransactionId>,
    timestamp: Option<OffsetDateTime>,
}

/// Result of a bulk transaction restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkRestoreReport {
    pub transaction_id: TransactionId,
    /// Entities restored by this call.
    pub restored: u64,
    pub restored_by_type: BTreeMap<String, u64>,
}

/// An outstanding log entry, optionally with the current entity row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutstandingItem {
    pub entry: DeleteLogRow,
    /// Current row as JSON; only loaded on request.
    pub entity: Option<serde_json::Value>,
}

/// Request-scoped handle driving deletes and restores.
pub struct Coordinator {
    service: SoftDeletes,
    batch: BatchState,
}

impl Coordinator {
    pub fn service(&self) -> &SoftDeletes {
        &self.service
    }

    pub fn config(&self) -> &SoftDeleteConfig {
        self.service.config()
    }

    fn store(&self) -> Arc<SqliteStore> {
        self.service.store().clone()
    }

    /// Cached transaction id, if this handle has opened one.
    pub fn cached_transaction_id(&self) -> Option<TransactionId> {
        self.batch.transaction_id
    }

    // =========================================================================
    // Transaction identity and timestamp
    // =========================================================================

    /// Current transaction id, opening a new transaction if none is cached.
    pub async fn current_transaction_id(&mut self) -> SoftDeleteResult<TransactionId> {
        if let Some(transaction_id) = self.batch.transaction_id {
            return Ok(transaction_id);
        }
        self.new_transaction().await
    }

    /// Open a new transaction and make it current, replacing any cached one.
    pub async fn new_transaction(&mut self) -> SoftDeleteResult<TransactionId> {
        let store = self.store();
        let mut conn = store.pool().acquire().await?;
        self.new_transaction_in(&mut conn).await
    }

    /// Like [`current_transaction_id`](Self::current_transaction_id), on the
    /// caller's connection.
    pub async fn current_transaction_id_in(
        &mut self,
        conn: &mut SqliteConnection,
    ) -> SoftDeleteResult<TransactionId> {
        if let Some(transaction_id) = self.batch.transaction_id {
            return Ok(transaction_id);
        }
        self.new_transaction_in(conn).await
    }

    /// Like [`new_transaction`](Self::new_transaction), on the caller's connection.
    pub async fn new_transaction_in(
        &mut self,
        conn: &mut SqliteConnection,
    ) -> SoftDeleteResult<TransactionId> {
        let deleted_by_id = self.service.current_actor();
        let deleted_at = OffsetDateTime::now_utc();
        let transaction_id = self
            .service
            .store()
            .insert_transaction(conn, deleted_by_id, deleted_at)
            .await?;

        self.batch = BatchState {
            transaction_id: Some(transaction_id),
            timestamp: Some(deleted_at),
        };

        tracing::debug!(
            transaction_id = %transaction_id,
            deleted_by_id = deleted_by_id,
            "Opened delete transaction"
        );
        Ok(transaction_id)
    }

    /// Timestamp shared by the operations of this batch.
    ///
    /// In `fresh` mode a new timestamp is minted on every call.
    pub fn shared_timestamp(&mut self) -> OffsetDateTime {
        match (self.config().timestamp_mode, self.batch.timestamp) {
            (TimestampMode::Reuse, Some(timestamp)) => timestamp,
            _ => {
                let timestamp = OffsetDateTime::now_utc();
                self.batch.timestamp = Some(timestamp);
                timestamp
            }
        }
    }

    // =========================================================================
    // Log bookkeeping (run inside the caller's store transaction)
    // =========================================================================

    /// Log the deletion of one entity under the current transaction.
    pub async fn record_deletion(
        &mut self,
        conn: &mut SqliteConnection,
        entity_type: &str,
        entity_id: &str,
    ) -> SoftDeleteResult<(TransactionId, LogEntryId)> {
        let store = self.store();
        let transaction_id = self.current_transaction_id_in(&mut *conn).await?;
        if let Some(entry_id) = store
            .insert_log_entry(&mut *conn, transaction_id, entity_type, entity_id)
            .await?
        {
            return Ok((transaction_id, entry_id));
        }

        // The cached transaction was closed elsewhere; start a new batch
        tracing::debug!(
            transaction_id = %transaction_id,
            "Cached delete transaction is closed, opening a new one"
        );
        let transaction_id = self.new_transaction_in(&mut *conn).await?;
        let entry_id = store
            .insert_log_entry(conn, transaction_id, entity_type, entity_id)
            .await?
            .ok_or_else(|| {
                SoftDeleteError::LogWrite(format!(
                    "delete transaction {transaction_id} closed before {entity_type} {entity_id} was logged"
                ))
            })?;
        Ok((transaction_id, entry_id))
    }

    /// Mark the single outstanding log entry of an entity restored.
    pub async fn record_restore(
        &self,
        conn: &mut SqliteConnection,
        entity_type: &str,
        entity_id: &str,
        restored_by_id: ActorId,
        restored_at: OffsetDateTime,
    ) -> SoftDeleteResult<DeleteLogRow> {
        let store = self.service.store();
        let mut entry = store
            .find_outstanding_entry(&mut *conn, entity_type, entity_id)
            .await?
            .ok_or_else(|| {
                SoftDeleteError::NotFound(format!(
                    "no outstanding log entry for {entity_type} {entity_id}"
                ))
            })?;

        if !store
            .mark_entry_restored(conn, entry.id, restored_by_id, restored_at)
            .await?
        {
            return Err(SoftDeleteError::NotFound(format!(
                "log entry {} for {entity_type} {entity_id} is already restored",
                entry.id
            )));
        }

        entry.restored_at = Some(restored_at);
        entry.restored_by_id = Some(restored_by_id);
        Ok(entry)
    }

    /// Stamp a transaction restored if none of its entries are outstanding.
    ///
    /// Returns true only for the call that closed the transaction; an already
    /// closed transaction keeps its original stamp. Closing the cached
    /// transaction clears the cache so later deletes open a new one.
    pub async fn close_transaction_if_empty(
        &mut self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
        restored_by_id: ActorId,
        restored_at: OffsetDateTime,
    ) -> SoftDeleteResult<bool> {
        let store = self.service.store();
        let outstanding = store.count_outstanding(&mut *conn, transaction_id).await?;
        if outstanding > 0 {
            return Ok(false);
        }

        let closed = store
            .mark_transaction_restored(conn, transaction_id, restored_by_id, restored_at)
            .await?;
        if closed {
            if self.batch.transaction_id == Some(transaction_id) {
                self.batch = BatchState::default();
            }
            tracing::info!(
                transaction_id = %transaction_id,
                restored_by_id = restored_by_id,
                "Delete transaction fully restored"
            );
        }
        Ok(closed)
    }

    // =========================================================================
    // Entity delete and restore
    // =========================================================================

    /// Soft delete an entity.
    ///
    /// The log entry and the marker are written in one store transaction; on
    /// success the in-memory marker is set to the returned transaction id.
    #[tracing::instrument(skip(self, entity), fields(entity_type = E::ENTITY_TYPE, entity_id = %entity.entity_id()))]
    pub async fn delete<E: SoftDeletable>(
        &mut self,
        entity: &mut E,
    ) -> SoftDeleteResult<TransactionId> {
        let entity_id = entity.entity_id();
        if let Some(transaction_id) = entity.deletion_marker() {
            return Err(SoftDeleteError::AlreadyDeleted(format!(
                "{} {entity_id} was deleted under transaction {transaction_id}",
                E::ENTITY_TYPE
            )));
        }
        let table = EntityTable::of::<E>(self.config())?;

        let store = self.store();
        let snapshot = self.batch.clone();
        let mut tx = store.begin().await?;

        let result = self
            .delete_in(&mut tx, E::ENTITY_TYPE, &table, &entity_id)
            .await;
        let result = self.settle(tx, result, snapshot).await;

        match result {
            Ok(transaction_id) => {
                entity.set_deletion_marker(Some(transaction_id));
                tracing::info!(transaction_id = %transaction_id, "Entity soft deleted");
                Ok(transaction_id)
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind(), "Soft delete rolled back");
                Err(e)
            }
        }
    }

    async fn delete_in<K: EntityKey>(
        &mut self,
        conn: &mut SqliteConnection,
        entity_type: &str,
        table: &EntityTable,
        entity_id: &K,
    ) -> SoftDeleteResult<TransactionId> {
        let (transaction_id, _) = self
            .record_deletion(&mut *conn, entity_type, &entity_id.to_string())
            .await?;
        table.stamp_marker(conn, entity_id, transaction_id).await?;
        Ok(transaction_id)
    }

    /// Physically remove an entity, bypassing the log.
    #[tracing::instrument(skip(self, entity), fields(entity_type = E::ENTITY_TYPE, entity_id = %entity.entity_id()))]
    pub async fn force_delete<E: SoftDeletable>(&mut self, entity: &E) -> SoftDeleteResult<()> {
        let table = EntityTable::of::<E>(self.config())?;
        let store = self.store();
        let mut conn = store.pool().acquire().await?;

        if !table.hard_delete(&mut conn, &entity.entity_id()).await? {
            return Err(SoftDeleteError::NotFound(format!(
                "{} {} does not exist",
                E::ENTITY_TYPE,
                entity.entity_id()
            )));
        }
        if entity.is_deleted() {
            tracing::warn!("Hard deleted a soft-deleted entity; its log entry stays outstanding");
        }
        tracing::info!("Entity hard deleted");
        Ok(())
    }

    /// Restore a soft-deleted entity.
    ///
    /// Clears the marker, marks the log entry restored and closes the owning
    /// transaction when it was the last outstanding entry, all in one store
    /// transaction. Observers are notified after commit or rollback.
    #[tracing::instrument(skip(self, entity), fields(entity_type = E::ENTITY_TYPE, entity_id = %entity.entity_id()))]
    pub async fn restore<E: SoftDeletable>(&mut self, entity: &mut E) -> SoftDeleteResult<()> {
        let entity_id = entity.entity_id();
        let Some(transaction_id) = entity.deletion_marker() else {
            return Err(SoftDeleteError::NotFound(format!(
                "{} {entity_id} is not deleted",
                E::ENTITY_TYPE
            )));
        };
        let table = EntityTable::of::<E>(self.config())?;
        let event = RestoreEvent::new(E::ENTITY_TYPE, entity_id.to_string(), Some(transaction_id));

        let store = self.store();
        let snapshot = self.batch.clone();
        let mut tx = match store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                self.notify(&event, &Err(&e));
                return Err(e);
            }
        };

        let result = self.restore_row_in(&mut tx, &event, &table, &entity_id).await;
        let result = self.settle(tx, result, snapshot).await;

        match &result {
            Ok(()) => {
                entity.set_deletion_marker(None);
                tracing::info!(transaction_id = %transaction_id, "Entity restored");
            }
            Err(e) => tracing::warn!(error = %e, kind = e.kind(), "Restore rolled back"),
        }
        self.notify(&event, &result.as_ref().map(|_| ()));
        result
    }

    /// Restore a loaded entity inside the caller's store transaction.
    ///
    /// Observers are not notified; the caller reports the returned event once
    /// the transaction settles.
    pub async fn restore_entity_in<E: SoftDeletable>(
        &mut self,
        conn: &mut SqliteConnection,
        entity: &mut E,
    ) -> SoftDeleteResult<RestoreEvent> {
        let entity_id = entity.entity_id();
        let Some(transaction_id) = entity.deletion_marker() else {
            return Err(SoftDeleteError::NotFound(format!(
                "{} {entity_id} is not deleted",
                E::ENTITY_TYPE
            )));
        };
        let table = EntityTable::of::<E>(self.config())?;
        let event = RestoreEvent::new(E::ENTITY_TYPE, entity_id.to_string(), Some(transaction_id));

        self.restore_row_in(conn, &event, &table, &entity_id).await?;
        entity.set_deletion_marker(None);
        Ok(event)
    }

    /// The single per-entity restore path shared by single and bulk restore.
    pub(crate) async fn restore_row_in<K: EntityKey>(
        &mut self,
        conn: &mut SqliteConnection,
        event: &RestoreEvent,
        table: &EntityTable,
        entity_id: &K,
    ) -> SoftDeleteResult<()> {
        if !self.service.shared.observers.allow_restore(event) {
            return Err(SoftDeleteError::Vetoed {
                entity_type: event.entity_type.clone(),
                entity_id: event.entity_id.clone(),
            });
        }
        let Some(transaction_id) = event.transaction_id else {
            return Err(SoftDeleteError::NotFound(format!(
                "{} {} is not deleted",
                event.entity_type, event.entity_id
            )));
        };

        table
            .clear_marker(&mut *conn, entity_id, transaction_id)
            .await?;

        let restored_by_id = self.service.current_actor();
        let restored_at = self.shared_timestamp();
        let entry = self
            .record_restore(
                &mut *conn,
                &event.entity_type,
                &event.entity_id,
                restored_by_id,
                restored_at,
            )
            .await?;

        if entry.delete_transaction_id != transaction_id {
            return Err(SoftDeleteError::Integrity(format!(
                "{} {} is marked with transaction {transaction_id} but logged under {}",
                event.entity_type, event.entity_id, entry.delete_transaction_id
            )));
        }

        self.close_transaction_if_empty(conn, transaction_id, restored_by_id, restored_at)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Bulk restore
    // =========================================================================

    /// Restore every outstanding entity of a transaction, all or nothing.
    ///
    /// Entries are restored in log id order through their registered handler.
    /// Any failure, including an unregistered entity type or exceeding
    /// `restore_timeout_secs`, rolls the whole restore back.
    #[tracing::instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn restore_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<BulkRestoreReport> {
        let timeout = self.config().restore_timeout();
        let snapshot = self.batch.clone();
        let mut events = Vec::new();

        // Dropping the future on timeout drops the store transaction, which rolls back.
        let result =
            match tokio::time::timeout(timeout, self.restore_transaction_unit(transaction_id, &mut events))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SoftDeleteError::Timeout(timeout)),
            };

        if result.is_err() {
            self.batch = snapshot;
        }

        match &result {
            Ok(report) => tracing::info!(restored = report.restored, "Delete transaction restored"),
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind(), "Bulk restore rolled back")
            }
        }

        // Entities restored before a failure were rolled back with the rest.
        let outcome = match &result {
            Ok(_) => RestoreOutcome::Restored,
            Err(e) => RestoreOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };
        for event in &events {
            self.service.shared.observers.notify(event, &outcome);
        }
        result
    }

    async fn restore_transaction_unit(
        &mut self,
        transaction_id: TransactionId,
        events: &mut Vec<RestoreEvent>,
    ) -> SoftDeleteResult<BulkRestoreReport> {
        let store = self.store();
        let mut tx = store.begin().await?;

        let result = self
            .restore_transaction_in(&mut tx, transaction_id, events)
            .await;

        match result {
            Ok(report) => {
                tx.commit().await?;
                Ok(report)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    async fn restore_transaction_in(
        &mut self,
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
        events: &mut Vec<RestoreEvent>,
    ) -> SoftDeleteResult<BulkRestoreReport> {
        let store = self.store();
        if store
            .get_transaction(&mut *conn, transaction_id)
            .await?
            .is_none()
        {
            return Err(SoftDeleteError::NotFound(format!(
                "delete transaction {transaction_id} does not exist"
            )));
        }

        let mut entries = store
            .outstanding_entries(&mut *conn, transaction_id)
            .await?;
        // The query already orders by id; keep the order independent of the store.
        entries.sort_by_key(|entry| entry.id);

        let mut restored_by_type = BTreeMap::new();
        for entry in &entries {
            let handler = self
                .service
                .registry()
                .get(&entry.model_class)
                .ok_or_else(|| {
                    SoftDeleteError::Integrity(format!(
                        "log entry {} references unregistered entity type '{}'",
                        entry.id, entry.model_class
                    ))
                })?;

            let event = handler
                .restore_logged(self, &mut *conn, &entry.row_id)
                .await?;
            events.push(event);
            *restored_by_type
                .entry(entry.model_class.clone())
                .or_insert(0u64) += 1;
        }

        let restored_by_id = self.service.current_actor();
        let restored_at = self.shared_timestamp();
        self.close_transaction_if_empty(&mut *conn, transaction_id, restored_by_id, restored_at)
            .await?;

        let closed = store
            .get_transaction(&mut *conn, transaction_id)
            .await?
            .is_some_and(|record| record.is_restored());
        if !closed {
            return Err(SoftDeleteError::Integrity(format!(
                "delete transaction {transaction_id} still has outstanding entries after restore"
            )));
        }

        Ok(BulkRestoreReport {
            transaction_id,
            restored: entries.len() as u64,
            restored_by_type,
        })
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Get a transaction record.
    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<Option<DeleteTransactionRow>> {
        let store = self.store();
        let mut conn = store.pool().acquire().await?;
        store.get_transaction(&mut conn, transaction_id).await
    }

    /// List transaction records, newest first.
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
        limit: u32,
    ) -> SoftDeleteResult<Vec<DeleteTransactionRow>> {
        let store = self.store();
        let mut conn = store.pool().acquire().await?;
        store.list_transactions(&mut conn, filter, limit).await
    }

    /// Every log entry of a transaction, restored or not.
    pub async fn entries(&self, transaction_id: TransactionId) -> SoftDeleteResult<Vec<DeleteLogRow>> {
        let store = self.store();
        let mut conn = store.pool().acquire().await?;
        store.entries_for_transaction(&mut conn, transaction_id).await
    }

    /// Number of entries of a transaction not yet restored.
    pub async fn outstanding_count(&self, transaction_id: TransactionId) -> SoftDeleteResult<u64> {
        let store = self.store();
        let mut conn = store.pool().acquire().await?;
        store.count_outstanding(&mut conn, transaction_id).await
    }

    /// Outstanding entry counts of a transaction per entity type.
    pub async fn outstanding_grouped_by_type(
        &self,
        transaction_id: TransactionId,
    ) -> SoftDeleteResult<Vec<TypeCount>> {
        let store = self.store();
        let mut conn = store.pool().acquire().await?;
        store
            .outstanding_grouped_by_type(&mut conn, transaction_id)
            .await
    }

    /// Outstanding entries of a transaction.
    ///
    /// With `hydrate`, each entry carries the current row loaded through its
    /// registered handler, bypassing the deleted-row filter. Entries of
    /// unregistered types are returned without a row.
    pub async fn outstanding_items(
        &self,
        transaction_id: TransactionId,
        hydrate: bool,
    ) -> SoftDeleteResult<Vec<OutstandingItem>> {
        let store = self.store();
        let mut conn = store.pool().acquire().await?;
        let entries = store
            .outstanding_entries(&mut conn, transaction_id)
            .await?;

        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let entity = if hydrate {
                match self.service.registry().get(&entry.model_class) {
                    Some(handler) => {
                        handler
                            .load_json(&mut conn, self.config(), &entry.row_id)
                            .await?
                    }
                    None => {
                        tracing::warn!(
                            entry_id = %entry.id,
                            entity_type = %entry.model_class,
                            "Cannot hydrate entry of unregistered entity type"
                        );
                        None
                    }
                }
            } else {
                None
            };
            items.push(OutstandingItem { entry, entity });
        }
        Ok(items)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove every transaction record and log entry.
    ///
    /// Refuses while entries are outstanding, since their entities still carry
    /// markers that would then reference nothing, unless `force` is set.
    #[tracing::instrument(skip(self))]
    pub async fn purge(&mut self, force: bool) -> SoftDeleteResult<PurgeStats> {
        let store = self.store();
        let mut tx = store.begin().await?;

        let outstanding = store.count_all_outstanding(&mut tx).await?;
        if outstanding > 0 && !force {
            rollback(tx).await;
            return Err(SoftDeleteError::Integrity(format!(
                "refusing to purge: {outstanding} log entries are outstanding"
            )));
        }

        let log_entries = store.truncate_log(&mut tx).await?;
        let transactions = store.truncate_transactions(&mut tx).await?;
        tx.commit().await?;

        self.batch = BatchState::default();
        tracing::warn!(
            transactions = transactions,
            log_entries = log_entries,
            outstanding = outstanding,
            "Purged delete log"
        );
        Ok(PurgeStats {
            transactions,
            log_entries,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Commit on success, roll back on failure. A failed unit also drops any
    /// transaction it opened from the cache, since that record no longer exists.
    async fn settle<T>(
        &mut self,
        tx: Transaction<'static, Sqlite>,
        result: SoftDeleteResult<T>,
        snapshot: BatchState,
    ) -> SoftDeleteResult<T> {
        match result {
            Ok(value) => match tx.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.batch = snapshot;
                    Err(e.into())
                }
            },
            Err(e) => {
                rollback(tx).await;
                self.batch = snapshot;
                Err(e)
            }
        }
    }

    fn notify(&self, event: &RestoreEvent, result: &Result<(), &SoftDeleteError>) {
        let outcome = match result {
            Ok(()) => RestoreOutcome::Restored,
            // A veto happens before any mutation; observers already know.
            Err(SoftDeleteError::Vetoed { .. }) => return,
            Err(e) => RestoreOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };
        self.service.shared.observers.notify(event, &outcome);
    }
}

async fn rollback(tx: Transaction<'static, Sqlite>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Store transaction rollback failed");
    }
}
