// src/application/ports/store.rs
use crate::domain::entry::LogEntryDraft;
use crate::domain::errors::TrackerResult;
use crate::domain::schema::{EntitySchema, Filter, StoredRow};
use async_trait::async_trait;
use sqlx::SqliteConnection;

/// Read access to the tracked entity's rows, used for the pre-write load on
/// batched paths. Implementations must not fire lifecycle hooks of their
/// own, or a tracked read would recurse into the tracker.
#[async_trait]
pub trait RowLoader: Send + Sync {
    fn schema(&self) -> &EntitySchema;

    async fn load_matching(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
    ) -> TrackerResult<Vec<StoredRow>>;
}

/// Append-only access to the log entity. One call writes one batch.
#[async_trait]
pub trait LogWriter: Send + Sync {
    async fn append_batch(
        &self,
        conn: &mut SqliteConnection,
        drafts: &[LogEntryDraft],
    ) -> TrackerResult<()>;
}
