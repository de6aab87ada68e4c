// src/lib.rs
//! Automatic audit trail for SQLite-backed entities.
//!
//! Every create, update, delete (single or batched), and optionally every
//! read performed through a bound [`Model`] is intercepted and written as
//! an immutable log entry linked to the affected row and the acting
//! principal:
//!
//! ```no_run
//! use papertrail_core::{Action, EntitySchema, SqlStore, TrackerConfig, TrackingContext, bind};
//! use serde_json::json;
//!
//! # async fn demo() -> papertrail_core::TrackerResult<()> {
//! let store = SqlStore::connect("sqlite::memory:").await?;
//! let users = store.define(EntitySchema::new("users", ["name"])?).await?;
//! let contacts = store
//!     .define(EntitySchema::new("contacts", ["name", "email"])?)
//!     .await?;
//!
//! let log = bind(
//!     &contacts,
//!     &store,
//!     TrackerConfig::new(&users).with_tracked_actions([Action::Create, Action::Update]),
//! )
//! .await?;
//!
//! let alice = users
//!     .create(
//!         json!({"name": "alice"}).as_object().unwrap(),
//!         &TrackingContext::anonymous().with_track(false),
//!     )
//!     .await?;
//!
//! let ctx = TrackingContext::for_user(alice.id);
//! contacts
//!     .create(json!({"name": "A", "email": "a@x.com"}).as_object().unwrap(), &ctx)
//!     .await?;
//! assert_eq!(log.count().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::binding::{bind, log_entity_name};
pub use application::ports::hooks::{HookPoint, LifecycleEvent, LifecycleHandler};
pub use application::ports::time::Clock;
pub use config::{ModelRef, TrackerConfig};
pub use domain::{
    Action, ChangeTuple, EntitySchema, FieldMap, Filter, LogEntry, StoredRow, TrackerError,
    TrackerResult, TrackingContext,
};
pub use infrastructure::{LogHandle, Model, SqlStore};
