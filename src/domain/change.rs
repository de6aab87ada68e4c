// src/domain/change.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One field-level before/after pair within a log entry's `changes`.
///
/// Serialized camelCase (`previousValue`) because the stored JSON is the
/// durable, externally queryable artifact. The empty string stands in for
/// "no previous value" on create and "no new value" on delete; it is
/// indistinguishable from a genuine empty-string field value, which is a
/// known collision kept for compatibility with existing log consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTuple {
    pub field: String,
    pub previous_value: Value,
    pub value: Value,
}

impl ChangeTuple {
    pub fn new(field: impl Into<String>, previous_value: Value, value: Value) -> Self {
        Self {
            field: field.into(),
            previous_value,
            value,
        }
    }

    /// The "no value on this side" sentinel.
    pub fn empty_sentinel() -> Value {
        Value::String(String::new())
    }
}
