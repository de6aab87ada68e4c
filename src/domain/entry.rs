// src/domain/entry.rs
use crate::domain::action::Action;
use crate::domain::change::ChangeTuple;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// An immutable audit record of one lifecycle event on one tracked row.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: i64,
    pub target_id: i64,
    pub user_id: i64,
    pub action: Action,
    pub changes: Option<Vec<ChangeTuple>>,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// A log entry before the store assigns its id.
#[derive(Debug, Clone)]
pub struct LogEntryDraft {
    pub target_id: i64,
    pub user_id: i64,
    pub action: Action,
    pub changes: Option<Vec<ChangeTuple>>,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}
