// tests/readonly_log.rs
mod support;

use papertrail_core::{Filter, TrackerConfig, TrackerError, TrackingContext, bind};
use serde_json::json;
use support::{contact_fixture, ctx, fields, setup};

#[tokio::test]
async fn existing_entries_cannot_be_updated() {
    let t = setup().await;
    let log = bind(&t.contacts, &t.store, TrackerConfig::new(&t.users))
        .await
        .unwrap();
    t.contacts.create(&contact_fixture(), &ctx(t.user_id)).await.unwrap();
    let before = log.entries().await.unwrap();

    let err = log
        .model()
        .update(before[0].id, &fields(json!({"action": "find"})), &ctx(t.user_id))
        .await
        .unwrap_err();

    assert!(matches!(err, TrackerError::ReadOnlyLog));
    assert_eq!(
        err.to_string(),
        "This is a read-only log. You cannot modify it."
    );
    assert_eq!(log.entries().await.unwrap(), before, "entry unchanged");
}

#[tokio::test]
async fn existing_entries_cannot_be_deleted() {
    let t = setup().await;
    let log = bind(&t.contacts, &t.store, TrackerConfig::new(&t.users))
        .await
        .unwrap();
    t.contacts.create(&contact_fixture(), &ctx(t.user_id)).await.unwrap();
    let before = log.entries().await.unwrap();

    let err = log
        .model()
        .delete(before[0].id, &ctx(t.user_id))
        .await
        .unwrap_err();

    assert!(matches!(err, TrackerError::ReadOnlyLog));
    assert_eq!(log.entries().await.unwrap(), before);
}

#[tokio::test]
async fn bulk_mutations_are_rejected_too() {
    let t = setup().await;
    let log = bind(&t.contacts, &t.store, TrackerConfig::new(&t.users))
        .await
        .unwrap();
    t.contacts.create(&contact_fixture(), &ctx(t.user_id)).await.unwrap();

    let err = log
        .model()
        .bulk_update(&Filter::new(), &fields(json!({"action": "find"})), &ctx(t.user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::ReadOnlyLog));

    let err = log
        .model()
        .bulk_delete(&Filter::new(), &ctx(t.user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::ReadOnlyLog));

    assert_eq!(log.count().await.unwrap(), 1);
}

#[tokio::test]
async fn log_rows_survive_the_generic_row_loader() {
    let t = setup().await;
    let log = bind(&t.contacts, &t.store, TrackerConfig::new(&t.users))
        .await
        .unwrap();
    let target = t.contacts.create(&contact_fixture(), &ctx(t.user_id)).await.unwrap();

    // The log table's INTEGER columns must not break the schema-driven
    // loader; its decode is what puts the guard in reach of update/delete.
    let rows = log
        .model()
        .find(&Filter::new(), &TrackingContext::anonymous())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("target_id"), Some(&json!(target.id)));
    assert_eq!(rows[0].get("user_id"), Some(&json!(t.user_id)));
    assert_eq!(rows[0].get("action"), Some(&json!("create")));
}

#[tokio::test]
async fn guard_holds_inside_a_caller_transaction() {
    let t = setup().await;
    let log = bind(&t.contacts, &t.store, TrackerConfig::new(&t.users))
        .await
        .unwrap();
    t.contacts.create(&contact_fixture(), &ctx(t.user_id)).await.unwrap();
    let entry_id = log.entries().await.unwrap()[0].id;

    let mut tx = t.store.pool().begin().await.unwrap();
    let err = log
        .model()
        .delete_in_tx(&mut *tx, entry_id, &ctx(t.user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::ReadOnlyLog));
    tx.rollback().await.unwrap();

    assert_eq!(log.count().await.unwrap(), 1);
}
