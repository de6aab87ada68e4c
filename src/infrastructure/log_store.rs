// src/infrastructure/log_store.rs
//! The append-only log table: DDL with the binding's cascade mode, the
//! batched insert the tracker writes through, and the query handle handed
//! back to the caller.

use crate::application::ports::store::LogWriter;
use crate::domain::action::Action;
use crate::domain::change::ChangeTuple;
use crate::domain::entry::{LogEntry, LogEntryDraft};
use crate::domain::errors::{TrackerError, TrackerResult};
use crate::infrastructure::sql::{map_error, quote_ident};
use crate::infrastructure::store::Model;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::fmt;

/// Insert-only access to one binding's log table.
pub(crate) struct LogTable {
    table: String,
}

impl LogTable {
    pub(crate) fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    /// With `persistent` the reference columns carry no foreign-key
    /// constraint: an enforced one would forbid the orphaned log rows the
    /// mode promises. Without it, both references cascade with their
    /// parent row.
    pub(crate) fn ddl(
        &self,
        target_table: &str,
        principal_table: &str,
        persistent: bool,
    ) -> String {
        let reference = |parent: &str| {
            if persistent {
                String::new()
            } else {
                format!(" REFERENCES {}(\"id\") ON DELETE CASCADE", quote_ident(parent))
            }
        };

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"target_id\" INTEGER NOT NULL{}, \
             \"user_id\" INTEGER NOT NULL{}, \
             \"action\" TEXT NOT NULL, \
             \"changes\" TEXT, \
             \"metadata\" TEXT NOT NULL DEFAULT '[]', \
             \"timestamp\" TEXT NOT NULL)",
            quote_ident(&self.table),
            reference(target_table),
            reference(principal_table),
        )
    }
}

fn encode_changes(changes: Option<&Vec<ChangeTuple>>) -> TrackerResult<Option<String>> {
    changes
        .map(|c| serde_json::to_string(c).map_err(|e| TrackerError::store(e.to_string())))
        .transpose()
}

#[async_trait]
impl LogWriter for LogTable {
    async fn append_batch(
        &self,
        conn: &mut SqliteConnection,
        drafts: &[LogEntryDraft],
    ) -> TrackerResult<()> {
        if drafts.is_empty() {
            return Ok(());
        }

        let encoded: Vec<Option<String>> = drafts
            .iter()
            .map(|d| encode_changes(d.changes.as_ref()))
            .collect::<TrackerResult<_>>()?;

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} (\"target_id\", \"user_id\", \"action\", \"changes\", \"metadata\", \"timestamp\") ",
            quote_ident(&self.table)
        ));
        builder.push_values(drafts.iter().zip(encoded), |mut b, (draft, changes)| {
            b.push_bind(draft.target_id);
            b.push_bind(draft.user_id);
            b.push_bind(draft.action.as_str());
            b.push_bind(changes);
            b.push_bind(draft.metadata.to_string());
            b.push_bind(draft.timestamp);
        });

        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct LogEntryRow {
    id: i64,
    target_id: i64,
    user_id: i64,
    action: String,
    changes: Option<String>,
    metadata: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<LogEntryRow> for LogEntry {
    type Error = TrackerError;

    fn try_from(row: LogEntryRow) -> Result<Self, Self::Error> {
        let changes = row
            .changes
            .map(|raw| {
                serde_json::from_str::<Vec<ChangeTuple>>(&raw)
                    .map_err(|e| TrackerError::store(e.to_string()))
            })
            .transpose()?;
        let metadata: Value = serde_json::from_str(&row.metadata)
            .map_err(|e| TrackerError::store(e.to_string()))?;

        Ok(LogEntry {
            id: row.id,
            target_id: row.target_id,
            user_id: row.user_id,
            action: row.action.parse::<Action>()?,
            changes,
            metadata,
            timestamp: row.timestamp,
        })
    }
}

/// Returned by `bind` for downstream querying of the log entity. Mutations
/// through the underlying model are rejected by the installed guard.
#[derive(Clone)]
pub struct LogHandle {
    model: Model,
    pool: SqlitePool,
}

impl fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle")
            .field("table", &self.table_name())
            .finish_non_exhaustive()
    }
}

impl LogHandle {
    pub(crate) fn new(model: Model, pool: SqlitePool) -> Self {
        Self { model, pool }
    }

    pub fn table_name(&self) -> &str {
        self.model.name()
    }

    /// The guarded log model, for callers going through the store API.
    pub fn model(&self) -> &Model {
        &self.model
    }

    const COLUMNS: &'static str =
        "\"id\", \"target_id\", \"user_id\", \"action\", \"changes\", \"metadata\", \"timestamp\"";

    /// Every entry, oldest first.
    pub async fn entries(&self) -> TrackerResult<Vec<LogEntry>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY \"id\"",
            Self::COLUMNS,
            quote_ident(self.table_name())
        );
        let rows = sqlx::query_as::<_, LogEntryRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_error)?;
        rows.into_iter().map(LogEntry::try_from).collect()
    }

    pub async fn entries_for_target(&self, target_id: i64) -> TrackerResult<Vec<LogEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE \"target_id\" = ? ORDER BY \"id\"",
            Self::COLUMNS,
            quote_ident(self.table_name())
        );
        let rows = sqlx::query_as::<_, LogEntryRow>(&sql)
            .bind(target_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_error)?;
        rows.into_iter().map(LogEntry::try_from).collect()
    }

    pub async fn count(&self) -> TrackerResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(self.table_name())
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(map_error)
    }
}
