// src/application/record.rs
use crate::domain::action::Action;
use crate::domain::change::ChangeTuple;
use crate::domain::context::TrackingContext;
use crate::domain::entry::LogEntryDraft;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashSet;

/// Assembles log-entry drafts, applying the binding's per-action inclusion
/// toggle: a computed diff is attached only when the action is in
/// `tracked_actions`, and `find` entries never carry one.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    tracked_actions: HashSet<Action>,
}

impl RecordBuilder {
    pub fn new(tracked_actions: HashSet<Action>) -> Self {
        Self { tracked_actions }
    }

    pub fn build(
        &self,
        action: Action,
        target_id: i64,
        diff: Option<Vec<ChangeTuple>>,
        user_id: i64,
        ctx: &TrackingContext,
        timestamp: DateTime<Utc>,
    ) -> LogEntryDraft {
        let changes = if action.is_mutation() && self.tracked_actions.contains(&action) {
            diff
        } else {
            None
        };

        LogEntryDraft {
            target_id,
            user_id,
            action,
            changes,
            metadata: ctx.metadata.clone().unwrap_or_else(default_metadata),
            timestamp,
        }
    }
}

fn default_metadata() -> Value {
    json!([])
}
