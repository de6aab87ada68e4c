// src/infrastructure/sql.rs
//! Helpers for the dynamically built statements: identifier quoting and the
//! JSON-text codec for schema-less field values.
//!
//! Identifiers reaching these helpers were validated at schema construction;
//! quoting is belt on top of that check.

use crate::domain::errors::TrackerError;
use serde_json::Value;

pub fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

/// Field values are stored as JSON-encoded TEXT.
pub fn encode_value(value: &Value) -> String {
    value.to_string()
}

/// Columns written by the store always contain valid JSON. Columns the
/// store did not write (the log table's typed columns, read through the
/// generic loader only ahead of the read-only guard firing) fall back to
/// their raw text.
pub fn decode_value(raw: Option<String>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
    }
}

pub fn map_error(err: sqlx::Error) -> TrackerError {
    TrackerError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::{decode_value, encode_value};
    use serde_json::json;

    #[test]
    fn codec_round_trips_json_values() {
        for value in [
            json!(null),
            json!(true),
            json!(0),
            json!(1.5),
            json!(""),
            json!("A"),
            json!([{"age": 25}]),
            json!({"nested": {"k": [1, 2]}}),
        ] {
            assert_eq!(decode_value(Some(encode_value(&value))), value);
        }
    }

    #[test]
    fn missing_column_decodes_as_null() {
        assert_eq!(decode_value(None), json!(null));
    }

    #[test]
    fn non_json_text_decodes_as_plain_string() {
        assert_eq!(
            decode_value(Some("2026-01-01T00:00:00Z".into())),
            json!("2026-01-01T00:00:00Z")
        );
    }
}
