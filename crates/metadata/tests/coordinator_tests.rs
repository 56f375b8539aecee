//! Integration tests for single-entity delete and restore.

mod common;

use common::{Gadget, RecordingObserver, TEST_ACTOR, TestMetadata};
use reclaim_core::config::{SoftDeleteConfig, TimestampMode};
use reclaim_core::{TransactionId, UNKNOWN_ACTOR_ID};
use reclaim_metadata::{RestoreOutcome, SoftDeletable, SoftDeletes};
use std::sync::Arc;
use time::OffsetDateTime;

#[tokio::test]
async fn test_delete_and_restore_walkthrough() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let mut a = metadata.insert_widget("a").await;
    let mut b = metadata.insert_widget("b").await;

    // First delete opens transaction 1
    let first = coordinator.delete(&mut a).await.unwrap();
    assert_eq!(first, TransactionId::new(1));
    assert_eq!(a.deletion_marker(), Some(first));
    assert_eq!(metadata.widget(a.id).await.delete_transaction_id, Some(first));

    let record = metadata.transaction(first).await;
    assert_eq!(record.deleted_by_id, TEST_ACTOR);
    assert!(!record.is_restored());

    // Second delete in the same batch reuses it
    let second = coordinator.delete(&mut b).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(metadata.transaction_count().await, 1);

    let log = metadata.log().await;
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.delete_transaction_id == first));
    assert_eq!(log[0].model_class, "Widget");
    assert_eq!(log[0].row_id, a.id.to_string());
    assert_eq!(log[1].row_id, b.id.to_string());

    // Restoring one of two leaves the transaction open
    coordinator.restore(&mut a).await.unwrap();
    assert!(!a.is_deleted());
    assert_eq!(metadata.widget(a.id).await.delete_transaction_id, None);
    assert_eq!(coordinator.outstanding_count(first).await.unwrap(), 1);
    let log = metadata.log().await;
    assert!(!log[0].is_outstanding());
    assert_eq!(log[0].restored_by_id, Some(TEST_ACTOR));
    assert!(log[1].is_outstanding());
    assert!(!metadata.transaction(first).await.is_restored());

    // Restoring the last one closes it
    coordinator.restore(&mut b).await.unwrap();
    assert_eq!(coordinator.outstanding_count(first).await.unwrap(), 0);
    let record = metadata.transaction(first).await;
    assert!(record.is_restored());
    assert_eq!(record.restored_by_id, Some(TEST_ACTOR));

    // A closed transaction is not reused
    assert_eq!(coordinator.cached_transaction_id(), None);
    let third = coordinator.delete(&mut a).await.unwrap();
    coordinator.delete(&mut b).await.unwrap();
    assert_eq!(third, TransactionId::new(2));

    let report = coordinator.restore_transaction(third).await.unwrap();
    assert_eq!(report.restored, 2);
    assert!(metadata.transaction(third).await.is_restored());
    assert!(!metadata.widget(a.id).await.is_deleted());
    assert!(!metadata.widget(b.id).await.is_deleted());
}

#[tokio::test]
async fn test_restore_live_entity_is_not_found() {
    let metadata = TestMetadata::new().await.unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let service = metadata.builder().observer(observer.clone()).build().unwrap();
    let mut coordinator = service.coordinator();

    let mut widget = metadata.insert_widget("live").await;
    let err = coordinator.restore(&mut widget).await.unwrap_err();

    assert_eq!(err.kind(), "not_found");
    assert!(observer.asked().is_empty());
    assert!(observer.notified().is_empty());
    assert!(metadata.log().await.is_empty());
    assert_eq!(metadata.transaction_count().await, 0);
}

#[tokio::test]
async fn test_restore_with_stale_marker_is_not_found() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let mut widget = metadata.insert_widget("w").await;
    coordinator.delete(&mut widget).await.unwrap();
    let mut stale = widget.clone();
    coordinator.restore(&mut widget).await.unwrap();

    let err = coordinator.restore(&mut stale).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(stale.is_deleted());
}

#[tokio::test]
async fn test_log_failure_leaves_entity_live() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();
    metadata.fail_log_inserts().await;

    let mut widget = metadata.insert_widget("w").await;
    let err = coordinator.delete(&mut widget).await.unwrap_err();

    assert_eq!(err.kind(), "log_write");
    assert!(!widget.is_deleted());
    assert!(!metadata.widget(widget.id).await.is_deleted());
    assert!(metadata.log().await.is_empty());
    // The transaction record was created in the rolled back unit
    assert_eq!(metadata.transaction_count().await, 0);
    assert_eq!(coordinator.cached_transaction_id(), None);
}

#[tokio::test]
async fn test_marker_failure_rolls_back_log_entry() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let mut first = metadata.insert_widget("first").await;
    let transaction_id = coordinator.delete(&mut first).await.unwrap();

    metadata.fail_widget_marker_writes().await;
    let mut second = metadata.insert_widget("second").await;
    let err = coordinator.delete(&mut second).await.unwrap_err();

    assert_eq!(err.kind(), "marker_write");
    assert!(!metadata.widget(second.id).await.is_deleted());
    let log = metadata.log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].row_id, first.id.to_string());
    // The committed transaction stays current
    assert_eq!(coordinator.cached_transaction_id(), Some(transaction_id));
}

#[tokio::test]
async fn test_delete_twice_is_rejected() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let mut widget = metadata.insert_widget("w").await;
    let stale = widget.clone();
    coordinator.delete(&mut widget).await.unwrap();

    let err = coordinator.delete(&mut widget).await.unwrap_err();
    assert_eq!(err.kind(), "already_deleted");

    // A stale copy still carries a null marker; the guarded update catches it
    let mut stale = stale;
    let err = coordinator.delete(&mut stale).await.unwrap_err();
    assert_eq!(err.kind(), "marker_write");
    assert_eq!(metadata.log().await.len(), 1);
}

#[tokio::test]
async fn test_restore_failure_leaves_state_unchanged() {
    let metadata = TestMetadata::new().await.unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let service = metadata.builder().observer(observer.clone()).build().unwrap();
    let mut coordinator = service.coordinator();

    let mut widget = metadata.insert_widget("w").await;
    let transaction_id = coordinator.delete(&mut widget).await.unwrap();
    let log_before = metadata.log().await;

    metadata.fail_widget_restore(widget.id).await;
    let err = coordinator.restore(&mut widget).await.unwrap_err();

    assert_eq!(err.kind(), "marker_write");
    assert_eq!(widget.deletion_marker(), Some(transaction_id));
    assert_eq!(
        metadata.widget(widget.id).await.delete_transaction_id,
        Some(transaction_id)
    );
    assert_eq!(metadata.log().await, log_before);
    assert!(!metadata.transaction(transaction_id).await.is_restored());

    let notified = observer.notified();
    assert_eq!(notified.len(), 1);
    assert!(matches!(
        &notified[0].1,
        RestoreOutcome::Failed { kind: "marker_write", .. }
    ));
}

#[tokio::test]
async fn test_veto_blocks_restore_without_notification() {
    let metadata = TestMetadata::new().await.unwrap();
    let mut widget = metadata.insert_widget("guarded").await;
    let observer = Arc::new(RecordingObserver::vetoing(&widget.id.to_string()));
    let service = metadata
        .builder()
        .observer_for("Widget", observer.clone())
        .build()
        .unwrap();
    let mut coordinator = service.coordinator();

    let transaction_id = coordinator.delete(&mut widget).await.unwrap();
    let err = coordinator.restore(&mut widget).await.unwrap_err();

    assert_eq!(err.kind(), "vetoed");
    assert!(widget.is_deleted());
    assert!(metadata.widget(widget.id).await.is_deleted());
    assert_eq!(coordinator.outstanding_count(transaction_id).await.unwrap(), 1);
    assert_eq!(observer.asked(), vec![widget.id.to_string()]);
    assert!(observer.notified().is_empty());
}

#[tokio::test]
async fn test_observer_notified_after_commit() {
    let metadata = TestMetadata::new().await.unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let service = metadata.builder().observer(observer.clone()).build().unwrap();
    let mut coordinator = service.coordinator();

    let mut widget = metadata.insert_widget("w").await;
    coordinator.delete(&mut widget).await.unwrap();
    coordinator.restore(&mut widget).await.unwrap();

    assert_eq!(
        observer.notified(),
        vec![(widget.id.to_string(), RestoreOutcome::Restored)]
    );
}

#[tokio::test]
async fn test_close_transaction_is_idempotent() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let mut widget = metadata.insert_widget("w").await;
    let transaction_id = coordinator.delete(&mut widget).await.unwrap();

    let now = OffsetDateTime::now_utc();
    let mut conn = metadata.pool().acquire().await.unwrap();
    // Outstanding entry keeps it open
    assert!(
        !coordinator
            .close_transaction_if_empty(&mut conn, transaction_id, 7, now)
            .await
            .unwrap()
    );
    drop(conn);

    coordinator.restore(&mut widget).await.unwrap();
    let closed = metadata.transaction(transaction_id).await;
    assert!(closed.is_restored());

    let mut conn = metadata.pool().acquire().await.unwrap();
    assert!(
        !coordinator
            .close_transaction_if_empty(&mut conn, transaction_id, 7, now)
            .await
            .unwrap()
    );
    drop(conn);
    assert_eq!(metadata.transaction(transaction_id).await, closed);
}

#[tokio::test]
async fn test_new_transaction_starts_fresh_batch() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let mut a = metadata.insert_widget("a").await;
    let mut b = metadata.insert_widget("b").await;

    let first = coordinator.delete(&mut a).await.unwrap();
    let fresh = coordinator.new_transaction().await.unwrap();
    assert_ne!(first, fresh);
    assert_eq!(coordinator.current_transaction_id().await.unwrap(), fresh);

    let second = coordinator.delete(&mut b).await.unwrap();
    assert_eq!(second, fresh);
    assert_eq!(coordinator.outstanding_count(first).await.unwrap(), 1);
    assert_eq!(coordinator.outstanding_count(fresh).await.unwrap(), 1);
}

#[tokio::test]
async fn test_coordinators_do_not_share_batches() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut first = service.coordinator();
    let mut second = service.coordinator();

    let mut a = metadata.insert_widget("a").await;
    let mut b = metadata.insert_widget("b").await;

    let t1 = first.delete(&mut a).await.unwrap();
    let t2 = second.delete(&mut b).await.unwrap();
    assert_ne!(t1, t2);
}

#[tokio::test]
async fn test_delete_after_batch_closed_elsewhere_opens_new_transaction() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut deleting = service.coordinator();
    let mut restoring = service.coordinator();

    let mut x = metadata.insert_widget("x").await;
    let mut y = metadata.insert_widget("y").await;

    let first = deleting.delete(&mut x).await.unwrap();
    restoring.restore(&mut x).await.unwrap();
    assert!(metadata.transaction(first).await.is_restored());
    // Still cached by the deleting handle
    assert_eq!(deleting.cached_transaction_id(), Some(first));

    let second = deleting.delete(&mut y).await.unwrap();
    assert_ne!(second, first);
    assert_eq!(y.deletion_marker(), Some(second));
    assert_eq!(deleting.cached_transaction_id(), Some(second));

    assert_eq!(deleting.outstanding_count(first).await.unwrap(), 0);
    assert_eq!(deleting.outstanding_count(second).await.unwrap(), 1);
    assert_eq!(metadata.transaction_count().await, 2);

    restoring.restore(&mut y).await.unwrap();
    assert!(metadata.transaction(second).await.is_restored());
}

#[tokio::test]
async fn test_actor_falls_back_to_config_then_sentinel() {
    let metadata = TestMetadata::new().await.unwrap();

    let anonymous = SoftDeletes::builder(metadata.store.clone())
        .register::<common::Widget>()
        .unwrap()
        .build()
        .unwrap();
    let mut widget = metadata.insert_widget("a").await;
    let transaction_id = anonymous.coordinator().delete(&mut widget).await.unwrap();
    assert_eq!(
        metadata.transaction(transaction_id).await.deleted_by_id,
        UNKNOWN_ACTOR_ID
    );

    let configured = SoftDeletes::builder(metadata.store.clone())
        .config(SoftDeleteConfig {
            actor_id: Some(9),
            ..Default::default()
        })
        .build()
        .unwrap();
    let mut widget = metadata.insert_widget("b").await;
    let transaction_id = configured.coordinator().delete(&mut widget).await.unwrap();
    assert_eq!(metadata.transaction(transaction_id).await.deleted_by_id, 9);
}

#[tokio::test]
async fn test_reuse_mode_freezes_restore_timestamp() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();
    assert_eq!(service.config().timestamp_mode, TimestampMode::Reuse);

    let mut a = metadata.insert_widget("a").await;
    let mut b = metadata.insert_widget("b").await;
    let mut c = metadata.insert_widget("c").await;
    coordinator.delete(&mut a).await.unwrap();
    coordinator.delete(&mut b).await.unwrap();
    coordinator.delete(&mut c).await.unwrap();

    coordinator.restore(&mut a).await.unwrap();
    coordinator.restore(&mut b).await.unwrap();

    let log = metadata.log().await;
    assert!(log[0].restored_at.is_some());
    assert_eq!(log[0].restored_at, log[1].restored_at);
}

#[tokio::test]
async fn test_fresh_mode_mints_new_timestamps() {
    let config = SoftDeleteConfig {
        timestamp_mode: TimestampMode::Fresh,
        ..Default::default()
    };
    let metadata = TestMetadata::with_config(&config).await.unwrap();
    let service = metadata.builder().config(config).build().unwrap();
    let mut coordinator = service.coordinator();

    let first = coordinator.shared_timestamp();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = coordinator.shared_timestamp();
    assert!(second > first);
}

#[tokio::test]
async fn test_force_delete_skips_log() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let widget = metadata.insert_widget("gone").await;
    coordinator.force_delete(&widget).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM widgets")
        .fetch_one(metadata.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(metadata.log().await.is_empty());
    assert_eq!(metadata.transaction_count().await, 0);

    let err = coordinator.force_delete(&widget).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_text_keys_and_custom_marker_column() {
    let metadata = TestMetadata::new().await.unwrap();
    let service = metadata.service();
    let mut coordinator = service.coordinator();

    let mut gadget: Gadget = metadata.insert_gadget("SKU-1", "lamp").await;
    let transaction_id = coordinator.delete(&mut gadget).await.unwrap();

    let marker: Option<i64> = sqlx::query_scalar("SELECT trashed_in FROM gadgets WHERE sku = ?")
        .bind("SKU-1")
        .fetch_one(metadata.pool())
        .await
        .unwrap();
    assert_eq!(marker, Some(transaction_id.get()));
    assert_eq!(metadata.log().await[0].row_id, "SKU-1");

    coordinator.restore(&mut gadget).await.unwrap();
    assert!(!gadget.is_deleted());
    assert!(metadata.transaction(transaction_id).await.is_restored());
}
