#![allow(dead_code)]

use chrono::Utc;
use rowsync::types::{
    ChangeEvent, Entity, EventMetadata, EventType, FieldData, FieldType, FieldValue,
};
use std::future::Future;
use std::time::Duration;

pub fn entity(fields: &[(&str, &str)]) -> Entity {
    let mut entity = Entity::new();
    for (name, value) in fields {
        entity.insert(FieldData {
            name: name.to_string(),
            value: FieldValue::String(value.to_string()),
            is_primary_key: false,
            field_type: FieldType::String,
        });
    }

    entity
}

pub fn event(
    db: &str,
    table: &str,
    id: i64,
    event_type: EventType,
    before: Option<Entity>,
    after: Option<Entity>,
) -> ChangeEvent {
    ChangeEvent {
        metadata: EventMetadata {
            db: db.to_string(),
            table: table.to_string(),
            primary_key_name: "id".to_string(),
        },
        timestamp: Utc::now(),
        event_type,
        before,
        after,
        primary_key: Some(FieldData {
            name: "id".to_string(),
            value: FieldValue::Integer(id),
            is_primary_key: true,
            field_type: FieldType::Integer,
        }),
    }
}

pub fn insert_event(db: &str, table: &str, id: i64) -> ChangeEvent {
    event(db, table, id, EventType::Insert, None, Some(entity(&[])))
}

pub fn update_event(
    db: &str,
    table: &str,
    id: i64,
    before: &[(&str, &str)],
    after: &[(&str, &str)],
) -> ChangeEvent {
    event(
        db,
        table,
        id,
        EventType::Update,
        Some(entity(before)),
        Some(entity(after)),
    )
}

pub fn delete_event(db: &str, table: &str, id: i64, before: &[(&str, &str)]) -> ChangeEvent {
    event(db, table, id, EventType::Delete, Some(entity(before)), None)
}

/// Polls `condition` until it holds or the timeout elapses.
pub async fn wait_until<F, Fut>(condition: F, timeout: Duration, what: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
