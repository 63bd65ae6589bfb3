use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::str::FromStr;
use tracing::error;

use crate::types::{ChangeEvent, Entity, FieldData, FieldType, FieldValue};

/// Datetime formats accepted for DATE-typed string values, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.3f",
    "%Y-%m-%dT%H:%M:%S%.3fZ",
];

/// Date-only fallback format for DATE-typed string values.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time-of-day format for DATE-typed `HH:MM:SS` string values.
const TIME_FORMAT: &str = "%H:%M:%S";

/// Reconciles every field of an event with its declared type.
///
/// Wire serialization collapses typed scalars into plain JSON shapes, so a
/// DECIMAL may arrive as a string and a DATE as an epoch number. This is the
/// single sanctioned mutation of field data after capture; fields are
/// treated as read-only once the event enters the pipeline.
pub fn normalize_event(event: &mut ChangeEvent) {
    if let Some(primary_key) = event.primary_key.as_mut() {
        normalize_field(primary_key);
    }
    if let Some(before) = event.before.as_mut() {
        normalize_entity(before);
    }
    if let Some(after) = event.after.as_mut() {
        normalize_entity(after);
    }
}

fn normalize_entity(entity: &mut Entity) {
    for field in entity.fields.values_mut() {
        normalize_field(field);
    }
}

/// Converts a single field value to its declared type where possible.
///
/// Values that already match, nulls, and values of type STRING or OTHER are
/// left untouched. Unparseable values are logged and kept as-is so a single
/// bad field does not lose the event.
pub fn normalize_field(field: &mut FieldData) {
    if matches!(field.value, FieldValue::Null) || field.value.is_of_type(field.field_type) {
        return;
    }

    match field.field_type {
        FieldType::Integer => {
            let raw = field.value.to_plain_string();
            match i64::from_str(raw.trim()) {
                Ok(value) => field.value = FieldValue::Integer(value),
                Err(err) => {
                    error!(field = %field.name, value = %raw, error = %err, "failed to normalize INTEGER field");
                }
            }
        }
        FieldType::Float => {
            let raw = field.value.to_plain_string();
            match f64::from_str(raw.trim()) {
                Ok(value) => field.value = FieldValue::Float(value),
                Err(err) => {
                    error!(field = %field.name, value = %raw, error = %err, "failed to normalize FLOAT field");
                }
            }
        }
        FieldType::Decimal => {
            let raw = field.value.to_plain_string();
            match BigDecimal::from_str(raw.trim()) {
                Ok(value) => field.value = FieldValue::Decimal(value),
                Err(err) => {
                    error!(field = %field.name, value = %raw, error = %err, "failed to normalize DECIMAL field");
                }
            }
        }
        FieldType::Date => normalize_date_field(field),
        FieldType::String | FieldType::Other => {}
    }
}

fn normalize_date_field(field: &mut FieldData) {
    match &field.value {
        FieldValue::Integer(millis) => {
            // Epoch milliseconds, the shape JSON serialization gives dates.
            match DateTime::from_timestamp_millis(*millis) {
                Some(datetime) => field.value = FieldValue::Date(datetime.naive_utc()),
                None => {
                    error!(field = %field.name, value = millis, "epoch value out of range for DATE field");
                }
            }
        }
        FieldValue::String(raw) => {
            if let Some(value) = parse_date_string(raw) {
                field.value = value;
            } else {
                error!(field = %field.name, value = %raw, "failed to normalize DATE field");
            }
        }
        _ => {}
    }
}

fn parse_date_string(raw: &str) -> Option<FieldValue> {
    // Bare time-of-day values come from TIME columns; they have no date part
    // to promote.
    if raw.len() == 8 {
        if let Ok(time) = NaiveTime::parse_from_str(raw, TIME_FORMAT) {
            return Some(FieldValue::Time(time));
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(FieldValue::Date(datetime));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Some(FieldValue::Date(date.and_hms_opt(0, 0, 0)?));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(value: FieldValue, field_type: FieldType) -> FieldData {
        FieldData {
            name: "f".to_string(),
            value,
            is_primary_key: false,
            field_type,
        }
    }

    #[test]
    fn integer_from_string() {
        let mut f = field(FieldValue::String("123".to_string()), FieldType::Integer);
        normalize_field(&mut f);
        assert_eq!(f.value, FieldValue::Integer(123));
    }

    #[test]
    fn integer_from_decimal_drift() {
        // Untagged deserialization turns numeric strings into decimals.
        let mut f = field(
            FieldValue::Decimal(BigDecimal::from_str("42").unwrap()),
            FieldType::Integer,
        );
        normalize_field(&mut f);
        assert_eq!(f.value, FieldValue::Integer(42));
    }

    #[test]
    fn float_from_string() {
        let mut f = field(FieldValue::String("1.5".to_string()), FieldType::Float);
        normalize_field(&mut f);
        assert_eq!(f.value, FieldValue::Float(1.5));
    }

    #[test]
    fn decimal_from_integer() {
        let mut f = field(FieldValue::Integer(10), FieldType::Decimal);
        normalize_field(&mut f);
        assert_eq!(
            f.value,
            FieldValue::Decimal(BigDecimal::from_str("10").unwrap())
        );
    }

    #[test]
    fn date_from_epoch_millis() {
        let mut f = field(FieldValue::Integer(1_600_000_000_000), FieldType::Date);
        normalize_field(&mut f);
        assert!(matches!(f.value, FieldValue::Date(_)));
    }

    #[test]
    fn date_from_datetime_string() {
        let mut f = field(
            FieldValue::String("2023-05-01 10:20:30".to_string()),
            FieldType::Date,
        );
        normalize_field(&mut f);
        assert!(matches!(f.value, FieldValue::Date(_)));
    }

    #[test]
    fn time_of_day_string_becomes_time() {
        let mut f = field(FieldValue::String("12:30:45".to_string()), FieldType::Date);
        normalize_field(&mut f);
        assert_eq!(
            f.value,
            FieldValue::Time(NaiveTime::from_hms_opt(12, 30, 45).unwrap())
        );
    }

    #[test]
    fn unparseable_date_is_kept() {
        let mut f = field(FieldValue::String("not a date".to_string()), FieldType::Date);
        normalize_field(&mut f);
        assert_eq!(f.value, FieldValue::String("not a date".to_string()));
    }

    #[test]
    fn null_and_matching_values_untouched() {
        let mut f = field(FieldValue::Null, FieldType::Integer);
        normalize_field(&mut f);
        assert_eq!(f.value, FieldValue::Null);

        let mut f = field(FieldValue::Integer(5), FieldType::Integer);
        normalize_field(&mut f);
        assert_eq!(f.value, FieldValue::Integer(5));
    }
}
