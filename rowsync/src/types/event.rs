use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Classification of row-level change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// A new row was added to the source table.
    Insert,
    /// An existing row was modified.
    Update,
    /// A row was removed from the source table.
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Declared type of a captured field value.
///
/// The declared type travels with the value so that downstream stages can
/// repair type drift introduced by wire serialization (see
/// [`crate::conversions`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Integer,
    Float,
    Decimal,
    Date,
    String,
    Other,
}

/// Typed scalar value of a captured field.
///
/// Serialized untagged so the wire form is a plain JSON scalar, matching what
/// capture protocols emit. Deserialization therefore recovers the closest
/// JSON shape, not necessarily the declared [`FieldType`]; the normalizer
/// reconciles the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Float(f64),
    Decimal(BigDecimal),
    Date(NaiveDateTime),
    Time(NaiveTime),
    String(String),
    Json(serde_json::Value),
}

impl FieldValue {
    /// Returns true if the value is already of the declared type.
    pub fn is_of_type(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (FieldValue::Integer(_), FieldType::Integer)
                | (FieldValue::Float(_), FieldType::Float)
                | (FieldValue::Decimal(_), FieldType::Decimal)
                | (FieldValue::Date(_), FieldType::Date)
                | (FieldValue::Time(_), FieldType::Date)
                | (FieldValue::String(_), FieldType::String)
        )
    }

    /// Renders the value as a plain string, the form used for ordering keys
    /// and log lines.
    pub fn to_plain_string(&self) -> String {
        match self {
            FieldValue::Null => "null".to_string(),
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Decimal(v) => v.to_string(),
            FieldValue::Date(v) => v.format("%Y-%m-%d %H:%M:%S").to_string(),
            FieldValue::Time(v) => v.format("%H:%M:%S").to_string(),
            FieldValue::String(v) => v.clone(),
            FieldValue::Json(v) => v.to_string(),
        }
    }
}

/// One captured field: its name, typed value, and primary key marker.
///
/// Constructed once at capture time and mutated at most once by the
/// normalizer before entering the pipeline; read-only downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    /// Column name in the source table.
    pub name: String,
    /// Typed scalar value.
    pub value: FieldValue,
    /// Whether this field is part of the source table's primary key.
    pub is_primary_key: bool,
    /// Declared type of the value at capture time.
    pub field_type: FieldType,
}

/// A row image: field name to [`FieldData`], keys unique, order irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Captured fields keyed by column name.
    pub fields: HashMap<String, FieldData>,
}

impl Entity {
    /// Creates an empty row image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the field with the given name, if captured.
    pub fn field(&self, name: &str) -> Option<&FieldData> {
        self.fields.get(name)
    }

    /// Adds a field to the image, replacing any previous entry with the same
    /// name.
    pub fn insert(&mut self, field: FieldData) {
        self.fields.insert(field.name.clone(), field);
    }
}

/// Source identity of a change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Source database name.
    pub db: String,
    /// Source table name.
    pub table: String,
    /// Name of the primary key column; composite keys are joined with `_`.
    pub primary_key_name: String,
}

/// One captured row-level mutation with before/after images.
///
/// Invariants: a DELETE has `before` set and `after` unset, an INSERT has
/// `after` set and `before` unset, an UPDATE has both. `primary_key` is
/// resolvable for every well-formed event and, together with `db` and
/// `table`, forms the ordering key used for shard selection and transport
/// ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Source identity of the change.
    pub metadata: EventMetadata,
    /// Commit timestamp of the change at the source.
    pub timestamp: DateTime<Utc>,
    /// Kind of mutation.
    pub event_type: EventType,
    /// Row image before the change; unset for INSERT.
    pub before: Option<Entity>,
    /// Row image after the change; unset for DELETE.
    pub after: Option<Entity>,
    /// Primary key field of the changed row.
    pub primary_key: Option<FieldData>,
}

impl ChangeEvent {
    /// Returns the `db.table` key used for consumer and config lookup.
    pub fn table_key(&self) -> String {
        format!("{}.{}", self.metadata.db, self.metadata.table)
    }

    /// Returns the composite ordering key for this event.
    ///
    /// The same key selects the broker ordering partition and the worker
    /// pool shard, so per-row ordering composes end to end.
    pub fn ordering_key(&self) -> String {
        let primary_key = self
            .primary_key
            .as_ref()
            .map(|field| field.value.to_plain_string())
            .unwrap_or_else(|| "null".to_string());

        format!("{}{}{primary_key}", self.metadata.db, self.metadata.table)
    }

    /// Returns a compact description of the event for log lines.
    pub fn summary(&self) -> String {
        let primary_key = self
            .primary_key
            .as_ref()
            .map(|field| field.value.to_plain_string())
            .unwrap_or_else(|| "null".to_string());

        format!(
            "{{db={}, table={}, primaryKey={}, eventType={}, timestamp={}}}",
            self.metadata.db, self.metadata.table, primary_key, self.event_type, self.timestamp
        )
    }
}
