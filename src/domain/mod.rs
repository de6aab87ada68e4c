// src/domain/mod.rs
pub mod action;
pub mod change;
pub mod context;
pub mod entry;
pub mod errors;
pub mod schema;

pub use action::Action;
pub use change::ChangeTuple;
pub use context::TrackingContext;
pub use entry::{LogEntry, LogEntryDraft};
pub use errors::{TrackerError, TrackerResult};
pub use schema::{EntitySchema, FieldMap, Filter, StoredRow, RESERVED_FIELDS};
