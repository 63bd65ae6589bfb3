use chrono::{DateTime, Utc};
use tracing::trace;

use crate::bail;
use crate::conversions::normalize_event;
use crate::error::{ErrorKind, SyncResult};
use crate::transport::base::Transport;
use crate::types::{
    ChangeEvent, Entity, EventMetadata, EventType, FieldData, FieldType, FieldValue,
};

/// Operation type of a captured source record.
///
/// Only row mutations become change events; everything else (DDL,
/// heartbeats, transaction markers) is filtered out but still committed by
/// the caller so the stream position keeps moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOp {
    Insert,
    Update,
    Delete,
    Other,
}

/// Schema of one captured column.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceColumn {
    pub name: String,
    pub field_type: FieldType,
    pub is_primary_key: bool,
}

/// One typed record from the capture stream, with row images aligned to the
/// column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub db: String,
    pub table: String,
    pub op: SourceOp,
    pub timestamp: DateTime<Utc>,
    pub columns: Vec<SourceColumn>,
    /// Row image before the change, values aligned with `columns`.
    pub before: Option<Vec<FieldValue>>,
    /// Row image after the change, values aligned with `columns`.
    pub after: Option<Vec<FieldValue>>,
}

/// Builds a normalized [`ChangeEvent`] from a source record.
///
/// Returns `None` for filtered operation types. Composite primary keys are
/// joined with `_` for both the key name and the key value. Records whose
/// images do not match their operation type are malformed and rejected.
pub fn build_event(record: SourceRecord) -> SyncResult<Option<ChangeEvent>> {
    let event_type = match record.op {
        SourceOp::Insert => EventType::Insert,
        SourceOp::Update => EventType::Update,
        SourceOp::Delete => EventType::Delete,
        SourceOp::Other => return Ok(None),
    };

    let before = record
        .before
        .as_ref()
        .map(|values| build_entity(&record.columns, values));
    let after = record
        .after
        .as_ref()
        .map(|values| build_entity(&record.columns, values));

    match event_type {
        EventType::Insert if after.is_none() => {
            bail!(
                ErrorKind::InvalidEvent,
                "INSERT record has no after image",
                format!("{}.{}", record.db, record.table)
            );
        }
        EventType::Delete if before.is_none() => {
            bail!(
                ErrorKind::InvalidEvent,
                "DELETE record has no before image",
                format!("{}.{}", record.db, record.table)
            );
        }
        EventType::Update if before.is_none() || after.is_none() => {
            bail!(
                ErrorKind::InvalidEvent,
                "UPDATE record is missing a row image",
                format!("{}.{}", record.db, record.table)
            );
        }
        _ => {}
    }

    // DELETE carries only the before image, so the key is resolved from
    // whichever image exists.
    let key_image = after.as_ref().or(before.as_ref());
    let primary_key_name = join_primary_key_names(&record.columns);
    let primary_key = key_image.and_then(|image| resolve_primary_key(&record.columns, image));

    let mut event = ChangeEvent {
        metadata: EventMetadata {
            db: record.db,
            table: record.table,
            primary_key_name,
        },
        timestamp: record.timestamp,
        event_type,
        before,
        after,
        primary_key,
    };

    normalize_event(&mut event);

    Ok(Some(event))
}

fn build_entity(columns: &[SourceColumn], values: &[FieldValue]) -> Entity {
    let mut entity = Entity::new();
    for (column, value) in columns.iter().zip(values.iter()) {
        entity.insert(FieldData {
            name: column.name.clone(),
            value: value.clone(),
            is_primary_key: column.is_primary_key,
            field_type: column.field_type,
        });
    }

    entity
}

fn join_primary_key_names(columns: &[SourceColumn]) -> String {
    columns
        .iter()
        .filter(|column| column.is_primary_key)
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>()
        .join("_")
}

fn resolve_primary_key(columns: &[SourceColumn], image: &Entity) -> Option<FieldData> {
    let pk_columns: Vec<_> = columns.iter().filter(|c| c.is_primary_key).collect();

    match pk_columns.as_slice() {
        [] => None,
        [only] => image.field(&only.name).cloned(),
        many => {
            let name = join_primary_key_names(columns);
            let value = many
                .iter()
                .map(|column| {
                    image
                        .field(&column.name)
                        .map(|field| field.value.to_plain_string())
                        .unwrap_or_else(|| "null".to_string())
                })
                .collect::<Vec<_>>()
                .join("_");

            Some(FieldData {
                name,
                value: FieldValue::String(value),
                is_primary_key: true,
                field_type: FieldType::String,
            })
        }
    }
}

/// Turns capture records into change events and pushes them through the
/// transport.
///
/// Committing the record's stream position is always the caller's
/// obligation, filtered records included, so consumption never stalls on a
/// table full of uninteresting operations.
pub struct RecordHandler<T> {
    transport: T,
}

impl<T> RecordHandler<T>
where
    T: Transport,
{
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Handles one record; filtered operation types are a successful no-op.
    pub async fn handle(&self, record: SourceRecord) -> SyncResult<()> {
        let Some(event) = build_event(record)? else {
            trace!("filtered non-mutation record");

            return Ok(());
        };

        self.transport.send(event).await
    }
}
