// src/application/policy.rs
//! The two gates evaluated before any tracking work: per-call opt-out /
//! opt-in, then the mandatory-principal rule.

use crate::domain::context::TrackingContext;
use crate::domain::errors::{TrackerError, TrackerResult};

/// Gate for create/update/delete events. Tracking is on by default and is
/// skipped only when the caller explicitly set `track` to false; once
/// tracking proceeds, a missing principal aborts the business mutation
/// itself.
///
/// Returns the principal id to attribute, or `None` when the pipeline is
/// skipped entirely.
pub fn mutation_gate(ctx: &TrackingContext) -> TrackerResult<Option<i64>> {
    if ctx.track == Some(false) {
        return Ok(None);
    }
    require_principal(ctx).map(Some)
}

/// Gate for find events. Reads are opt-in: anything but an explicit `true`
/// means no record and no validation, even with no principal at all.
pub fn find_gate(ctx: &TrackingContext) -> TrackerResult<Option<i64>> {
    if ctx.track != Some(true) {
        return Ok(None);
    }
    require_principal(ctx).map(Some)
}

fn require_principal(ctx: &TrackingContext) -> TrackerResult<i64> {
    ctx.user_id.ok_or(TrackerError::MissingPrincipal)
}
