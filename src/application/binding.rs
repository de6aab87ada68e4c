// src/application/binding.rs
//! Registration: wires the tracker onto an entity's lifecycle points and
//! bootstraps the log table. The only component that touches the store's
//! schema/hook API.

use crate::application::ports::hooks::{HookPoint, LifecycleHandler};
use crate::application::ports::store::{LogWriter, RowLoader};
use crate::application::record::RecordBuilder;
use crate::application::tracker::{ReadOnlyGuard, TrackerHandler};
use crate::config::{ModelRef, TrackerConfig};
use crate::domain::action::Action;
use crate::domain::errors::{TrackerError, TrackerResult};
use crate::domain::schema::EntitySchema;
use crate::infrastructure::log_store::{LogHandle, LogTable};
use crate::infrastructure::sql::map_error;
use crate::infrastructure::store::{Model, SqlStore};
use std::sync::Arc;

const LOG_FIELDS: [&str; 6] = [
    "target_id",
    "user_id",
    "action",
    "changes",
    "metadata",
    "timestamp",
];

const TRACKED_POINTS: [HookPoint; 9] = [
    HookPoint::BeforeCreate,
    HookPoint::AfterCreate,
    HookPoint::BeforeBulkCreate,
    HookPoint::AfterBulkCreate,
    HookPoint::BeforeUpdate,
    HookPoint::BeforeBulkUpdate,
    HookPoint::BeforeDelete,
    HookPoint::BeforeBulkDelete,
    HookPoint::AfterFind,
];

const GUARDED_POINTS: [HookPoint; 4] = [
    HookPoint::BeforeUpdate,
    HookPoint::BeforeBulkUpdate,
    HookPoint::BeforeDelete,
    HookPoint::BeforeBulkDelete,
];

/// Derived, deterministic name of a target's log entity.
pub fn log_entity_name(target: &str) -> String {
    format!("{target}_log")
}

/// Binds a tracker onto `target`: creates the log table (cascade mode per
/// the config), installs the tracking handler at the target's lifecycle
/// points and the read-only guard on the log entity, and returns a handle
/// to the log entity for downstream querying.
///
/// All argument validation happens before the first side effect, so a
/// `Configuration` failure leaves no partial state behind.
pub async fn bind(
    target: &Model,
    store: &SqlStore,
    config: TrackerConfig,
) -> TrackerResult<LogHandle> {
    if store.model(target.name()).is_none() {
        return Err(TrackerError::configuration(format!(
            "target model {} is not defined on this store",
            target.name()
        )));
    }

    let user_model = match config.user_model() {
        ModelRef::Name(name) => store.model(name).ok_or_else(|| {
            TrackerError::configuration(format!("user model {name} is not defined on this store"))
        })?,
        ModelRef::Handle(model) => model.clone(),
    };

    if config.tracked_actions().contains(&Action::Find) {
        return Err(TrackerError::configuration(
            "find entries never carry changes and cannot be a tracked action",
        ));
    }

    let log_name = log_entity_name(target.name());
    if store.model(&log_name).is_some() {
        return Err(TrackerError::configuration(format!(
            "model {} is already tracked",
            target.name()
        )));
    }
    let log_schema = EntitySchema::new(log_name.clone(), LOG_FIELDS)?;

    let log_table = LogTable::new(log_name.clone());
    sqlx::query(&log_table.ddl(target.name(), user_model.name(), config.persistent()))
        .execute(store.pool())
        .await
        .map_err(map_error)?;
    let log_model = store.register(Arc::new(log_schema))?;

    let handler: Arc<dyn LifecycleHandler> = Arc::new(TrackerHandler::new(
        Arc::new(target.clone()) as Arc<dyn RowLoader>,
        Arc::new(log_table) as Arc<dyn LogWriter>,
        RecordBuilder::new(config.tracked_actions().clone()),
        store.clock(),
    ));
    for point in TRACKED_POINTS {
        target.install_hook(point, Arc::clone(&handler));
    }

    let guard: Arc<dyn LifecycleHandler> = Arc::new(ReadOnlyGuard);
    for point in GUARDED_POINTS {
        log_model.install_hook(point, Arc::clone(&guard));
    }

    tracing::info!(
        target_entity = target.name(),
        log_table = log_name,
        persistent = config.persistent(),
        "tracker bound"
    );
    Ok(LogHandle::new(log_model, store.pool().clone()))
}
