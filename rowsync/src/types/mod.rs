//! Core data types shared across the sync pipeline.

mod event;

pub use event::{
    ChangeEvent, Entity, EventMetadata, EventType, FieldData, FieldType, FieldValue,
};
