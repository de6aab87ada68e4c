// src/application/tracker.rs
//! The handler installed on a tracked entity's lifecycle points, plus the
//! guard installed on the log entity itself.

use crate::application::diff;
use crate::application::policy;
use crate::application::ports::hooks::{LifecycleEvent, LifecycleHandler};
use crate::application::ports::store::{LogWriter, RowLoader};
use crate::application::ports::time::Clock;
use crate::application::record::RecordBuilder;
use crate::domain::action::Action;
use crate::domain::change::ChangeTuple;
use crate::domain::context::TrackingContext;
use crate::domain::entry::LogEntryDraft;
use crate::domain::errors::{TrackerError, TrackerResult};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::slice;
use std::sync::Arc;

/// Converts lifecycle events on the tracked entity into log entries.
///
/// Installed at every hook point: the `before-create` arms only run the
/// policy gate so a missing principal aborts the create before any row is
/// written, while the record-writing arms sit where each action's row state
/// is available (`after-create` for ids, `before-update`/`before-delete`
/// for pre-images).
pub struct TrackerHandler {
    target: Arc<dyn RowLoader>,
    log: Arc<dyn LogWriter>,
    builder: RecordBuilder,
    clock: Arc<dyn Clock>,
}

impl TrackerHandler {
    pub fn new(
        target: Arc<dyn RowLoader>,
        log: Arc<dyn LogWriter>,
        builder: RecordBuilder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            target,
            log,
            builder,
            clock,
        }
    }

    /// One entry per affected row, written as a single batch.
    async fn record(
        &self,
        conn: &mut SqliteConnection,
        action: Action,
        user_id: i64,
        entries: Vec<(i64, Option<Vec<ChangeTuple>>)>,
        ctx: &TrackingContext,
    ) -> TrackerResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let timestamp = self.clock.now();
        let drafts: Vec<LogEntryDraft> = entries
            .into_iter()
            .map(|(target_id, diff)| {
                self.builder
                    .build(action, target_id, diff, user_id, ctx, timestamp)
            })
            .collect();

        tracing::debug!(
            target_entity = self.target.schema().name(),
            action = %action,
            entries = drafts.len(),
            "appending log entries"
        );
        self.log.append_batch(conn, &drafts).await
    }
}

#[async_trait]
impl LifecycleHandler for TrackerHandler {
    async fn handle(
        &self,
        conn: &mut SqliteConnection,
        event: LifecycleEvent<'_>,
        ctx: &TrackingContext,
    ) -> TrackerResult<()> {
        let schema = self.target.schema();

        match event {
            // Validation-only arms: fail the create before the row exists.
            LifecycleEvent::BeforeCreate { .. } | LifecycleEvent::BeforeBulkCreate { .. } => {
                policy::mutation_gate(ctx).map(|_| ())
            }

            LifecycleEvent::AfterCreate { row } => {
                let Some(user_id) = policy::mutation_gate(ctx)? else {
                    return Ok(());
                };
                let entries = slice::from_ref(row)
                    .iter()
                    .map(|r| (r.id, Some(diff::creation_changes(schema, &r.fields))))
                    .collect();
                self.record(conn, Action::Create, user_id, entries, ctx).await
            }

            LifecycleEvent::AfterBulkCreate { rows } => {
                let Some(user_id) = policy::mutation_gate(ctx)? else {
                    return Ok(());
                };
                let entries = rows
                    .iter()
                    .map(|r| (r.id, Some(diff::creation_changes(schema, &r.fields))))
                    .collect();
                self.record(conn, Action::Create, user_id, entries, ctx).await
            }

            LifecycleEvent::BeforeUpdate { previous, current } => {
                let Some(user_id) = policy::mutation_gate(ctx)? else {
                    return Ok(());
                };
                let changes = diff::update_changes(schema, &previous.fields, current);
                self.record(conn, Action::Update, user_id, vec![(previous.id, Some(changes))], ctx)
                    .await
            }

            LifecycleEvent::BeforeBulkUpdate { filter, payload } => {
                let Some(user_id) = policy::mutation_gate(ctx)? else {
                    return Ok(());
                };
                // Pre-write read: the diff compares on-file state against
                // the literal request payload, so the load has to happen
                // before the update statement runs.
                let rows = self.target.load_matching(conn, filter).await?;
                let entries = rows
                    .iter()
                    .map(|r| {
                        (
                            r.id,
                            Some(diff::bulk_update_changes(schema, &r.fields, payload)),
                        )
                    })
                    .collect();
                self.record(conn, Action::Update, user_id, entries, ctx).await
            }

            LifecycleEvent::BeforeDelete { row } => {
                let Some(user_id) = policy::mutation_gate(ctx)? else {
                    return Ok(());
                };
                let changes = diff::deletion_changes(schema, &row.fields);
                self.record(conn, Action::Delete, user_id, vec![(row.id, Some(changes))], ctx)
                    .await
            }

            LifecycleEvent::BeforeBulkDelete { filter } => {
                let Some(user_id) = policy::mutation_gate(ctx)? else {
                    return Ok(());
                };
                let rows = self.target.load_matching(conn, filter).await?;
                let entries = rows
                    .iter()
                    .map(|r| (r.id, Some(diff::deletion_changes(schema, &r.fields))))
                    .collect();
                self.record(conn, Action::Delete, user_id, entries, ctx).await
            }

            LifecycleEvent::AfterFind { rows } => {
                let Some(user_id) = policy::find_gate(ctx)? else {
                    return Ok(());
                };
                let entries = rows.iter().map(|r| (r.id, None)).collect();
                self.record(conn, Action::Find, user_id, entries, ctx).await
            }
        }
    }
}

/// Installed on the log entity's update and delete points (single and
/// bulk). Fails unconditionally, before the attempt reaches storage.
pub struct ReadOnlyGuard;

#[async_trait]
impl LifecycleHandler for ReadOnlyGuard {
    async fn handle(
        &self,
        _conn: &mut SqliteConnection,
        _event: LifecycleEvent<'_>,
        _ctx: &TrackingContext,
    ) -> TrackerResult<()> {
        Err(TrackerError::ReadOnlyLog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{EntitySchema, FieldMap, Filter, StoredRow};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct StubLoader {
        schema: EntitySchema,
        rows: Vec<StoredRow>,
    }

    #[async_trait]
    impl RowLoader for StubLoader {
        fn schema(&self) -> &EntitySchema {
            &self.schema
        }

        async fn load_matching(
            &self,
            _conn: &mut SqliteConnection,
            _filter: &Filter,
        ) -> TrackerResult<Vec<StoredRow>> {
            Ok(self.rows.clone())
        }
    }

    #[derive(Default)]
    struct CapturingLog {
        batches: Mutex<Vec<Vec<LogEntryDraft>>>,
    }

    #[async_trait]
    impl LogWriter for CapturingLog {
        async fn append_batch(
            &self,
            _conn: &mut SqliteConnection,
            drafts: &[LogEntryDraft],
        ) -> TrackerResult<()> {
            self.batches.lock().unwrap().push(drafts.to_vec());
            Ok(())
        }
    }

    fn fields(value: serde_json::Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    fn handler(
        rows: Vec<StoredRow>,
        tracked: HashSet<Action>,
    ) -> (TrackerHandler, Arc<CapturingLog>) {
        let schema = EntitySchema::new("contacts", ["name", "email"]).unwrap();
        let log = Arc::new(CapturingLog::default());
        let handler = TrackerHandler::new(
            Arc::new(StubLoader { schema, rows }),
            Arc::clone(&log) as Arc<dyn LogWriter>,
            RecordBuilder::new(tracked),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())),
        );
        (handler, log)
    }

    async fn scratch_conn() -> SqliteConnection {
        use sqlx::Connection;
        SqliteConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn bulk_update_writes_one_entry_per_matched_row_in_one_batch() {
        let rows = vec![
            StoredRow { id: 1, fields: fields(json!({"name": "A", "email": "a@x.com"})) },
            StoredRow { id: 2, fields: fields(json!({"name": "B", "email": "b@x.com"})) },
        ];
        let (handler, log) = handler(rows, HashSet::from([Action::Update]));
        let payload = fields(json!({"name": "Z"}));
        let filter = Filter::new();
        let ctx = TrackingContext::for_user(7);

        let mut conn = scratch_conn().await;
        handler
            .handle(&mut conn, LifecycleEvent::BeforeBulkUpdate { filter: &filter, payload: &payload }, &ctx)
            .await
            .unwrap();

        let batches = log.batches.lock().unwrap();
        assert_eq!(batches.len(), 1, "exactly one batched write");
        let drafts = &batches[0];
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].target_id, 1);
        assert_eq!(
            drafts[0].changes.as_deref(),
            Some(&[ChangeTuple::new("name", json!("A"), json!("Z"))][..])
        );
        assert_eq!(drafts[1].target_id, 2);
    }

    #[tokio::test]
    async fn zero_matched_rows_write_nothing_and_raise_nothing() {
        let (handler, log) = handler(Vec::new(), HashSet::from([Action::Update]));
        let payload = fields(json!({"name": "Z"}));
        let filter = Filter::new();
        let ctx = TrackingContext::for_user(7);

        let mut conn = scratch_conn().await;
        handler
            .handle(&mut conn, LifecycleEvent::BeforeBulkUpdate { filter: &filter, payload: &payload }, &ctx)
            .await
            .unwrap();

        assert!(log.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_principal_fails_before_anything_is_written() {
        let (handler, log) = handler(Vec::new(), HashSet::from([Action::Update]));
        let values = fields(json!({"name": "A"}));
        let ctx = TrackingContext::anonymous();

        let mut conn = scratch_conn().await;
        let err = handler
            .handle(&mut conn, LifecycleEvent::BeforeCreate { values: &values }, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::MissingPrincipal));
        assert!(log.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn opted_out_mutation_skips_the_pipeline() {
        let (handler, log) = handler(Vec::new(), HashSet::from([Action::Update]));
        let previous = StoredRow { id: 1, fields: fields(json!({"name": "A", "email": "a@x.com"})) };
        let current = fields(json!({"name": "B", "email": "a@x.com"}));
        let ctx = TrackingContext::anonymous().with_track(false);

        let mut conn = scratch_conn().await;
        handler
            .handle(&mut conn, LifecycleEvent::BeforeUpdate { previous: &previous, current: &current }, &ctx)
            .await
            .unwrap();

        assert!(log.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_entries_carry_no_changes() {
        let rows = vec![StoredRow { id: 3, fields: fields(json!({"name": "A", "email": "a@x.com"})) }];
        let (handler, log) = handler(Vec::new(), HashSet::from([Action::Update]));
        let ctx = TrackingContext::for_user(7).with_track(true);

        let mut conn = scratch_conn().await;
        handler
            .handle(&mut conn, LifecycleEvent::AfterFind { rows: &rows }, &ctx)
            .await
            .unwrap();

        let batches = log.batches.lock().unwrap();
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].action, Action::Find);
        assert_eq!(batches[0][0].changes, None);
    }

    #[tokio::test]
    async fn guard_rejects_everything() {
        let row = StoredRow { id: 1, fields: FieldMap::new() };
        let current = FieldMap::new();
        let ctx = TrackingContext::for_user(7);

        let mut conn = scratch_conn().await;
        let err = ReadOnlyGuard
            .handle(&mut conn, LifecycleEvent::BeforeUpdate { previous: &row, current: &current }, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::ReadOnlyLog));
        assert_eq!(
            err.to_string(),
            "This is a read-only log. You cannot modify it."
        );
    }
}
