// src/domain/schema.rs
use crate::domain::errors::{TrackerError, TrackerResult};
use serde_json::Value;

/// Columns every store-managed table carries besides the declared fields.
pub const RESERVED_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Schema-less field values keyed by field name.
pub type FieldMap = serde_json::Map<String, Value>;

/// Name and ordered domain fields of a persisted entity. Field order is the
/// declaration order diffs are reported in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    name: String,
    fields: Vec<String>,
}

impl EntitySchema {
    pub fn new<N, F, I>(name: N, fields: I) -> TrackerResult<Self>
    where
        N: Into<String>,
        F: Into<String>,
        I: IntoIterator<Item = F>,
    {
        let name = name.into();
        validate_identifier(&name)?;

        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(TrackerError::configuration(format!(
                "entity {name} must declare at least one field"
            )));
        }
        for field in &fields {
            validate_identifier(field)?;
            if RESERVED_FIELDS.contains(&field.as_str()) {
                return Err(TrackerError::configuration(format!(
                    "field name {field} is reserved and managed by the store"
                )));
            }
            if fields.iter().filter(|f| *f == field).count() > 1 {
                return Err(TrackerError::configuration(format!(
                    "field {field} declared more than once on {name}"
                )));
            }
        }

        Ok(Self { name, fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Valid identifiers double as the safety boundary for dynamically built
/// SQL: every table and column name is checked here before it ever reaches
/// a statement.
fn validate_identifier(name: &str) -> TrackerResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TrackerError::configuration(format!(
            "invalid identifier: {name:?}"
        )))
    }
}

/// One persisted row: store-assigned id plus the declared field values.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: i64,
    pub fields: FieldMap,
}

impl StoredRow {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Conjunction of field = value conditions. An empty filter matches every
/// row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.conditions.push((field.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }
}
