//! Soft delete test store utilities.

use crate::common::fixtures::{Gadget, Widget};
use reclaim_core::config::SoftDeleteConfig;
use reclaim_core::{FixedActor, TransactionId};
use reclaim_metadata::models::{DeleteLogRow, DeleteTransactionRow};
use reclaim_metadata::{
    SoftDeleteQuery, SoftDeleteResult, SoftDeletes, SoftDeletesBuilder, SqliteStore,
};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;

/// Actor id reported by the default test service.
pub const TEST_ACTOR: i64 = 42;

/// A test database with the log tables and the fixture entity tables.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    pub async fn new() -> SoftDeleteResult<Self> {
        Self::with_config(&SoftDeleteConfig::default()).await
    }

    pub async fn with_config(config: &SoftDeleteConfig) -> SoftDeleteResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db"), None, &config.schema).await?;

        sqlx::query(
            r#"
CREATE TABLE widgets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    delete_transaction_id INTEGER
);
CREATE TABLE gadgets (
    sku TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    trashed_in INTEGER
);
"#,
        )
        .execute(store.pool())
        .await?;

        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        self.store.pool()
    }

    /// Builder with both fixture types registered and a fixed actor.
    pub fn builder(&self) -> SoftDeletesBuilder {
        SoftDeletes::builder(self.store.clone())
            .actor_provider(FixedActor(TEST_ACTOR))
            .register::<Widget>()
            .expect("register Widget")
            .register::<Gadget>()
            .expect("register Gadget")
    }

    pub fn service(&self) -> SoftDeletes {
        self.builder().build().expect("build service")
    }

    pub async fn insert_widget(&self, name: &str) -> Widget {
        sqlx::query_as::<_, Widget>("INSERT INTO widgets (name) VALUES (?) RETURNING *")
            .bind(name)
            .fetch_one(self.pool())
            .await
            .expect("insert widget")
    }

    pub async fn insert_gadget(&self, sku: &str, label: &str) -> Gadget {
        sqlx::query_as::<_, Gadget>("INSERT INTO gadgets (sku, label) VALUES (?, ?) RETURNING *")
            .bind(sku)
            .bind(label)
            .fetch_one(self.pool())
            .await
            .expect("insert gadget")
    }

    /// Reload a widget, deleted or not.
    pub async fn widget(&self, id: i64) -> Widget {
        let mut conn = self.pool().acquire().await.expect("acquire");
        SoftDeleteQuery::<Widget>::new(&SoftDeleteConfig::default())
            .expect("widget query")
            .include_deleted()
            .filter_eq("id", id)
            .fetch_optional(&mut conn)
            .await
            .expect("load widget")
            .expect("widget exists")
    }

    pub async fn transaction(&self, id: TransactionId) -> DeleteTransactionRow {
        sqlx::query_as::<_, DeleteTransactionRow>(
            "SELECT id, deleted_by_id, deleted_at, restored_at, restored_by_id \
             FROM delete_transaction WHERE id = ?",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .expect("transaction exists")
    }

    pub async fn transaction_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM delete_transaction")
            .fetch_one(self.pool())
            .await
            .expect("count transactions")
    }

    /// Every log entry, ordered by id.
    pub async fn log(&self) -> Vec<DeleteLogRow> {
        sqlx::query_as::<_, DeleteLogRow>(
            "SELECT id, delete_transaction_id, model_class, row_id, restored_at, restored_by_id \
             FROM delete_transaction_log ORDER BY id",
        )
        .fetch_all(self.pool())
        .await
        .expect("read log")
    }

    /// Make every insert into the log fail.
    pub async fn fail_log_inserts(&self) {
        self.exec(
            "CREATE TRIGGER fail_log_insert BEFORE INSERT ON delete_transaction_log \
             BEGIN SELECT RAISE(ABORT, 'injected log failure'); END",
        )
        .await;
    }

    /// Make stamping a widget's marker fail.
    pub async fn fail_widget_marker_writes(&self) {
        self.exec(
            "CREATE TRIGGER fail_widget_marker BEFORE UPDATE OF delete_transaction_id ON widgets \
             WHEN NEW.delete_transaction_id IS NOT NULL \
             BEGIN SELECT RAISE(ABORT, 'injected marker failure'); END",
        )
        .await;
    }

    /// Make clearing the marker of one widget fail.
    pub async fn fail_widget_restore(&self, id: i64) {
        self.exec(&format!(
            "CREATE TRIGGER fail_widget_restore_{id} BEFORE UPDATE OF delete_transaction_id ON widgets \
             WHEN OLD.id = {id} AND NEW.delete_transaction_id IS NULL \
             BEGIN SELECT RAISE(ABORT, 'injected restore failure'); END"
        ))
        .await;
    }

    pub async fn exec(&self, sql: &str) {
        sqlx::query(sql)
            .execute(self.pool())
            .await
            .expect("execute statement");
    }
}
