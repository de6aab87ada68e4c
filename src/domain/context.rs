// src/domain/context.rs
use serde_json::Value;

/// Per-call tracking context, passed explicitly alongside every store
/// operation. Replaces the ambient options bag of older trackers: there are
/// no implicit or global defaults.
#[derive(Debug, Clone, Default)]
pub struct TrackingContext {
    /// The principal attributed to the operation. Mandatory for every
    /// mutation that is not explicitly opted out of tracking.
    pub user_id: Option<i64>,
    /// `Some(false)` skips the tracking pipeline for mutations; reads are
    /// recorded only when this is `Some(true)`.
    pub track: Option<bool>,
    /// Opaque caller-supplied value stored verbatim on each entry.
    pub metadata: Option<Value>,
}

impl TrackingContext {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// A context with no principal. Only useful for untracked calls.
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_track(mut self, track: bool) -> Self {
        self.track = Some(track);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
