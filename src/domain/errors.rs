// src/domain/errors.rs
use thiserror::Error;

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Invalid binding-time arguments. Raised at setup, before any handler
    /// is installed or any table is created.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A mutation (or an explicitly tracked read) was attempted without a
    /// principal in the tracking context. Aborts the triggering operation.
    #[error("user_id is required in tracker options.")]
    MissingPrincipal,

    /// Any update or delete aimed at a log entry.
    #[error("This is a read-only log. You cannot modify it.")]
    ReadOnlyLog,

    /// Opaque failure from the persistence layer, bubbled as-is.
    #[error("persistence error: {0}")]
    Store(String),
}

impl TrackerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
