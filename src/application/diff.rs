// src/application/diff.rs
//! Field-level change computation. Pure and synchronous; callers load
//! whatever row state each action needs before calling in.

use crate::domain::change::ChangeTuple;
use crate::domain::schema::{EntitySchema, FieldMap, RESERVED_FIELDS};
use serde_json::Value;

/// Truthiness of a schema-less value, matching the semantics the log format
/// was defined under: null, false, numeric zero, and the empty string are
/// falsy; arrays and objects are truthy even when empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Declared fields minus the store-managed ones, in declaration order.
fn tracked_fields(schema: &EntitySchema) -> impl Iterator<Item = &str> {
    schema
        .fields()
        .iter()
        .map(String::as_str)
        .filter(|f| !RESERVED_FIELDS.contains(f))
}

/// Create: every tracked field becomes a tuple with an empty previous side.
pub fn creation_changes(schema: &EntitySchema, row: &FieldMap) -> Vec<ChangeTuple> {
    tracked_fields(schema)
        .map(|field| {
            ChangeTuple::new(
                field,
                ChangeTuple::empty_sentinel(),
                row.get(field).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Single-instance update with both snapshots known: a field is reported
/// only when its previous value is truthy and differs from the current one.
/// Falsy-to-anything transitions are deliberately dropped, even though the
/// value genuinely changed.
pub fn update_changes(
    schema: &EntitySchema,
    previous: &FieldMap,
    current: &FieldMap,
) -> Vec<ChangeTuple> {
    tracked_fields(schema)
        .filter_map(|field| {
            let before = previous.get(field).cloned().unwrap_or(Value::Null);
            let after = current.get(field).cloned().unwrap_or(Value::Null);
            (is_truthy(&before) && before != after)
                .then(|| ChangeTuple::new(field, before, after))
        })
        .collect()
}

/// Batched update matched by filter: the on-file row is compared against the
/// literal request payload, loaded before the write is applied. Fields
/// absent from the payload are never compared; a present field is reported
/// when the requested value is truthy and differs from what is on file.
pub fn bulk_update_changes(
    schema: &EntitySchema,
    on_file: &FieldMap,
    payload: &FieldMap,
) -> Vec<ChangeTuple> {
    tracked_fields(schema)
        .filter_map(|field| {
            let requested = payload.get(field)?;
            let before = on_file.get(field).cloned().unwrap_or(Value::Null);
            (is_truthy(requested) && *requested != before)
                .then(|| ChangeTuple::new(field, before, requested.clone()))
        })
        .collect()
}

/// Delete: symmetric to create, the new side is the empty sentinel.
pub fn deletion_changes(schema: &EntitySchema, row: &FieldMap) -> Vec<ChangeTuple> {
    tracked_fields(schema)
        .map(|field| {
            ChangeTuple::new(
                field,
                row.get(field).cloned().unwrap_or(Value::Null),
                ChangeTuple::empty_sentinel(),
            )
        })
        .collect()
}
