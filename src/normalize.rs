//! Result normalization: driver-native scanned values to logical values.
//!
//! Each executor decodes rows through this module so callers see one value
//! vocabulary regardless of vendor: strings, numbers, and booleans pass
//! through; byte slices become UTF-8 strings; temporal values become RFC 3339
//! strings; SQL NULL becomes JSON null.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

use crate::models::{AggregationResult, AggregationSeries, RecordData};

/// Label substituted for a null grouping key so UI labels never carry null.
pub(crate) const EMPTY_GROUP_LABEL: &str = "(empty)";

/// Byte sequences are decoded as UTF-8 text (lossily, so non-text blobs
/// still produce a printable value).
pub(crate) fn bytes_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::String(s),
        Err(e) => Value::String(String::from_utf8_lossy(e.as_bytes()).into_owned()),
    }
}

pub(crate) fn datetime_utc_value(value: DateTime<Utc>) -> Value {
    Value::String(value.to_rfc3339())
}

pub(crate) fn naive_datetime_value(value: NaiveDateTime) -> Value {
    Value::String(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

pub(crate) fn date_value(value: NaiveDate) -> Value {
    Value::String(value.format("%Y-%m-%d").to_string())
}

pub(crate) fn time_value(value: NaiveTime) -> Value {
    Value::String(value.format("%H:%M:%S%.f").to_string())
}

/// Fixed-precision decimals are reported as f64; values outside f64 range
/// are stringified rather than silently truncated.
pub(crate) fn decimal_value(value: &BigDecimal) -> Value {
    match value.to_f64().and_then(|f| f.is_finite().then_some(f)) {
        Some(f) => Value::from(f),
        None => Value::String(value.to_string()),
    }
}

/// Renders an aggregation grouping key as a label. Null keys become
/// [`EMPTY_GROUP_LABEL`]; non-string scalars are stringified.
pub(crate) fn group_label(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => EMPTY_GROUP_LABEL.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Coerces a normalized value to f64 for aggregation series.
pub(crate) fn value_as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Coerces a normalized value to u64 for count results.
pub(crate) fn value_as_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Extracts the single count from a `SELECT COUNT(*)` result.
pub(crate) fn scan_count(rows: &[RecordData]) -> u64 {
    rows.first()
        .and_then(|row| row.iter().next())
        .map(|(_, value)| value_as_u64(value))
        .unwrap_or(0)
}

/// Assembles an [`AggregationResult`] from label/value rows, in row order.
pub(crate) fn collect_aggregation(rows: &[RecordData], series_label: String) -> AggregationResult {
    let mut labels = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        labels.push(group_label(row.get_ignore_case("label")));
        values.push(
            row.get_ignore_case("value")
                .map(value_as_f64)
                .unwrap_or(0.0),
        );
    }
    AggregationResult {
        labels,
        series: vec![AggregationSeries {
            label: series_label,
            values,
        }],
    }
}

/// Decodes one MySQL row (internal store or external MySQL) into a record.
pub(crate) fn decode_mysql_row(row: &sqlx::mysql::MySqlRow) -> crate::Result<RecordData> {
    use sqlx::{Column, Row, TypeInfo};

    let mut record = RecordData::new();
    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_string();
        let value = decode_mysql_value(row, i, &type_name).map_err(|e| {
            crate::error::EngineError::query_failed(
                format!("failed to decode column '{}' ({})", column.name(), type_name),
                e,
            )
        })?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_mysql_value(
    row: &sqlx::mysql::MySqlRow,
    i: usize,
    type_name: &str,
) -> std::result::Result<Value, sqlx::Error> {
    use sqlx::Row;

    let value = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(i)?.map(Value::from),
        name if name.contains("UNSIGNED") => row.try_get::<Option<u64>, _>(i)?.map(Value::from),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            row.try_get::<Option<i64>, _>(i)?.map(Value::from)
        }
        "FLOAT" => row
            .try_get::<Option<f32>, _>(i)?
            .map(|f| Value::from(f64::from(f))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(i)?.map(Value::from),
        "DECIMAL" => row
            .try_get::<Option<BigDecimal>, _>(i)?
            .map(|d| decimal_value(&d)),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(i)?.map(date_value),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(i)?.map(time_value),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(i)?
            .map(naive_datetime_value),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(i)?
            .map(datetime_utc_value),
        "JSON" => row.try_get::<Option<Value>, _>(i)?,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Option<Vec<u8>>, _>(i)?
            .map(bytes_value),
        _ => row.try_get::<Option<String>, _>(i)?.map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Decodes one PostgreSQL row into a record.
#[cfg(feature = "postgres")]
pub(crate) fn decode_pg_row(row: &sqlx::postgres::PgRow) -> crate::Result<RecordData> {
    use sqlx::{Column, Row, TypeInfo};

    let mut record = RecordData::new();
    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_string();
        let value = decode_pg_value(row, i, &type_name).map_err(|e| {
            crate::error::EngineError::query_failed(
                format!("failed to decode column '{}' ({})", column.name(), type_name),
                e,
            )
        })?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[cfg(feature = "postgres")]
fn decode_pg_value(
    row: &sqlx::postgres::PgRow,
    i: usize,
    type_name: &str,
) -> std::result::Result<Value, sqlx::Error> {
    use sqlx::Row;

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::from),
        "INT2" => row
            .try_get::<Option<i16>, _>(i)?
            .map(|v| Value::from(i64::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(i)?
            .map(|v| Value::from(i64::from(v))),
        "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(i)?
            .map(|f| Value::from(f64::from(f))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(Value::from),
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(i)?
            .map(|d| decimal_value(&d)),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(i)?.map(date_value),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(i)?.map(time_value),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(i)?
            .map(naive_datetime_value),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(i)?
            .map(datetime_utc_value),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i)?,
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(i)?.map(bytes_value),
        _ => row.try_get::<Option<String>, _>(i)?.map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}
