//! Value conversions applied between transport and pipeline admission.

mod field;

pub use field::{normalize_event, normalize_field};
