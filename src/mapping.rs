//! Field-to-column mapping for the internal store's DDL.
//!
//! A pure table from abstract field type to the physical MySQL column type.
//! Unknown types fall back to the bounded varchar default so schema evolution
//! in the calling layer never blocks DDL; the fallback is logged so new field
//! types get flagged instead of silently riding on it.

use crate::models::FieldType;

/// Bounded varchar used for plain text and as the unknown-type fallback.
pub const DEFAULT_COLUMN_TYPE: &str = "VARCHAR(255)";

/// Maps an abstract field type to its physical column type for internal DDL.
///
/// The returned string is engine-controlled and therefore safe to
/// interpolate in DDL text (DDL accepts no placeholders in any supported
/// dialect).
pub fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text | FieldType::SingleSelect | FieldType::Radio => DEFAULT_COLUMN_TYPE,
        FieldType::LongText => "TEXT",
        FieldType::Number => "DECIMAL(20,6)",
        FieldType::Date => "DATE",
        FieldType::Datetime => "DATETIME(3)",
        FieldType::Checkbox => "TINYINT(1)",
        FieldType::Link => "VARCHAR(500)",
        FieldType::MultiSelect | FieldType::Attachment => "JSON",
        FieldType::Unknown => {
            tracing::warn!(
                fallback = DEFAULT_COLUMN_TYPE,
                "unrecognized field type, using default column type"
            );
            DEFAULT_COLUMN_TYPE
        }
    }
}
