// src/application/ports/hooks.rs
//! The lifecycle-hook contract the entity store exposes. Handlers are
//! installed once at binding time and fired by the store around each
//! operation, on the same connection the operation runs on — which is what
//! enlists handler writes in a caller-supplied transaction scope.

use crate::domain::context::TrackingContext;
use crate::domain::errors::TrackerResult;
use crate::domain::schema::{FieldMap, Filter, StoredRow};
use async_trait::async_trait;
use sqlx::SqliteConnection;

/// Named interception points in an entity's mutation/read flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeCreate,
    AfterCreate,
    BeforeBulkCreate,
    AfterBulkCreate,
    BeforeUpdate,
    BeforeBulkUpdate,
    BeforeDelete,
    BeforeBulkDelete,
    AfterFind,
}

/// Payload of one fired lifecycle event.
///
/// The bulk mutation variants deliberately carry the filter and request
/// payload rather than loaded rows: handlers that need the pre-image load
/// it themselves, before the write is applied.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    BeforeCreate { values: &'a FieldMap },
    AfterCreate { row: &'a StoredRow },
    BeforeBulkCreate { values: &'a [FieldMap] },
    AfterBulkCreate { rows: &'a [StoredRow] },
    BeforeUpdate { previous: &'a StoredRow, current: &'a FieldMap },
    BeforeBulkUpdate { filter: &'a Filter, payload: &'a FieldMap },
    BeforeDelete { row: &'a StoredRow },
    BeforeBulkDelete { filter: &'a Filter },
    AfterFind { rows: &'a [StoredRow] },
}

impl LifecycleEvent<'_> {
    pub fn point(&self) -> HookPoint {
        match self {
            Self::BeforeCreate { .. } => HookPoint::BeforeCreate,
            Self::AfterCreate { .. } => HookPoint::AfterCreate,
            Self::BeforeBulkCreate { .. } => HookPoint::BeforeBulkCreate,
            Self::AfterBulkCreate { .. } => HookPoint::AfterBulkCreate,
            Self::BeforeUpdate { .. } => HookPoint::BeforeUpdate,
            Self::BeforeBulkUpdate { .. } => HookPoint::BeforeBulkUpdate,
            Self::BeforeDelete { .. } => HookPoint::BeforeDelete,
            Self::BeforeBulkDelete { .. } => HookPoint::BeforeBulkDelete,
            Self::AfterFind { .. } => HookPoint::AfterFind,
        }
    }
}

/// A handler installed at one or more hook points. An error from a handler
/// fired at a `before-*` point aborts the operation before the write is
/// issued.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn handle(
        &self,
        conn: &mut SqliteConnection,
        event: LifecycleEvent<'_>,
        ctx: &TrackingContext,
    ) -> TrackerResult<()>;
}
