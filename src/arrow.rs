//! Row batches to Arrow record batches
//!
//! Two construction modes: `rows_to_batch` trusts the declared column types
//! (integer width, decimal precision and scale, timezone-awareness all
//! survive), `rows_to_frame` infers types from the data for the tabular-frame
//! path. Columns with no declared type fall back to inference in both modes.

use std::sync::Arc;

use arrow_array::builder::{
    BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder, Float32Builder,
    Float64Builder, Int16Builder, Int32Builder, Int64Builder, Int8Builder, StringBuilder,
    Time64MicrosecondBuilder, TimestampMicrosecondBuilder,
};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{NaiveDate, NaiveTime, Timelike};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::types::{ColumnMetadata, Row, SqlType, Value};

const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_DECIMAL_PRECISION: u8 = 38;
const DEFAULT_DECIMAL_SCALE: u8 = 9;

/// Build a record batch using the declared column types
pub fn rows_to_batch(
    rows: &[Row],
    columns: &[ColumnMetadata],
    timezone: Option<&str>,
) -> Result<RecordBatch> {
    let tz = timezone.unwrap_or(DEFAULT_TIMEZONE);

    // Data column order wins; the metadata only contributes types.
    let names: Vec<String> = match rows.first() {
        Some(row) => row.columns().to_vec(),
        None => columns.iter().map(|c| c.name.clone()).collect(),
    };

    let mut fields = Vec::with_capacity(names.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let declared = columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|c| c.sql_type.as_ref());
        let dtype = match declared {
            Some(t) => sql_type_to_arrow(t, tz),
            None => infer_type(rows, idx),
        };
        let array = build_column(rows, idx, name, &dtype)?;
        fields.push(Field::new(name, dtype, true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(Error::from)
}

/// Build a record batch with types inferred from the data
pub fn rows_to_frame(rows: &[Row]) -> Result<RecordBatch> {
    let Some(first) = rows.first() else {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    };

    let mut fields = Vec::with_capacity(first.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(first.len());
    for (idx, name) in first.columns().iter().enumerate() {
        let dtype = infer_type(rows, idx);
        let array = build_column(rows, idx, name, &dtype)?;
        fields.push(Field::new(name, dtype, true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(Error::from)
}

fn sql_type_to_arrow(sql_type: &SqlType, timezone: &str) -> DataType {
    match sql_type {
        SqlType::Bool => DataType::Boolean,
        SqlType::Int8 => DataType::Int8,
        SqlType::Int16 => DataType::Int16,
        SqlType::Int32 => DataType::Int32,
        SqlType::Int64 => DataType::Int64,
        SqlType::Float32 => DataType::Float32,
        SqlType::Float64 => DataType::Float64,
        SqlType::Decimal { precision, scale } => DataType::Decimal128(
            precision.unwrap_or(DEFAULT_DECIMAL_PRECISION),
            scale.unwrap_or(DEFAULT_DECIMAL_SCALE) as i8,
        ),
        SqlType::Text | SqlType::Uuid | SqlType::Json => DataType::Utf8,
        SqlType::Bytes => DataType::Binary,
        SqlType::Date => DataType::Date32,
        SqlType::Time => DataType::Time64(TimeUnit::Microsecond),
        SqlType::Timestamp { with_tz: false } => {
            DataType::Timestamp(TimeUnit::Microsecond, None)
        }
        SqlType::Timestamp { with_tz: true } => {
            DataType::Timestamp(TimeUnit::Microsecond, Some(timezone.into()))
        }
    }
}

fn infer_type(rows: &[Row], idx: usize) -> DataType {
    for row in rows {
        let dtype = match row.get(idx) {
            Some(Value::Bool(_)) => DataType::Boolean,
            Some(Value::Int8(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_)) => {
                DataType::Int64
            }
            Some(Value::Float32(_) | Value::Float64(_)) => DataType::Float64,
            Some(Value::Bytes(_)) => DataType::Binary,
            Some(Value::Date(_)) => DataType::Date32,
            Some(Value::Time(_)) => DataType::Time64(TimeUnit::Microsecond),
            Some(Value::DateTime(_)) => DataType::Timestamp(TimeUnit::Microsecond, None),
            Some(Value::DateTimeTz(_)) => {
                DataType::Timestamp(TimeUnit::Microsecond, Some(DEFAULT_TIMEZONE.into()))
            }
            // Decimals keep their text form: inference has no precision to
            // size a decimal column with.
            Some(
                Value::Decimal(_)
                | Value::String(_)
                | Value::Uuid(_)
                | Value::Json(_)
                | Value::Array(_),
            ) => DataType::Utf8,
            Some(Value::Null) | None => continue,
        };
        return dtype;
    }
    DataType::Utf8
}

fn build_column(rows: &[Row], idx: usize, name: &str, dtype: &DataType) -> Result<ArrayRef> {
    let value_at = |row: &Row| row.get(idx).cloned().unwrap_or(Value::Null);

    let array: ArrayRef = match dtype {
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => builder.append_value(
                        v.as_bool()
                            .ok_or_else(|| conversion_error(name, &v, "boolean"))?,
                    ),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Int8 => {
            let mut builder = Int8Builder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => {
                        let n = v
                            .as_i64()
                            .and_then(|n| i8::try_from(n).ok())
                            .ok_or_else(|| conversion_error(name, &v, "int8"))?;
                        builder.append_value(n);
                    }
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Int16 => {
            let mut builder = Int16Builder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => {
                        let n = v
                            .as_i64()
                            .and_then(|n| i16::try_from(n).ok())
                            .ok_or_else(|| conversion_error(name, &v, "int16"))?;
                        builder.append_value(n);
                    }
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Int32 => {
            let mut builder = Int32Builder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => {
                        let n = v
                            .as_i64()
                            .and_then(|n| i32::try_from(n).ok())
                            .ok_or_else(|| conversion_error(name, &v, "int32"))?;
                        builder.append_value(n);
                    }
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => builder.append_value(
                        v.as_i64()
                            .ok_or_else(|| conversion_error(name, &v, "int64"))?,
                    ),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float32 => {
            let mut builder = Float32Builder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => builder.append_value(
                        v.as_f64()
                            .ok_or_else(|| conversion_error(name, &v, "float32"))?
                            as f32,
                    ),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => builder.append_value(
                        v.as_f64()
                            .ok_or_else(|| conversion_error(name, &v, "float64"))?,
                    ),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Decimal128(precision, scale) => {
            let mut builder = Decimal128Builder::with_capacity(rows.len())
                .with_precision_and_scale(*precision, *scale)?;
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => builder.append_value(decimal_mantissa(name, &v, *scale)?),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::new();
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => builder.append_value(v.to_text()),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Binary => {
            let mut builder = BinaryBuilder::new();
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    v => builder.append_value(
                        v.as_bytes()
                            .ok_or_else(|| conversion_error(name, &v, "binary"))?,
                    ),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Date32 => {
            let mut builder = Date32Builder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    Value::Date(d) => builder.append_value(days_since_epoch(d)),
                    v => return Err(conversion_error(name, &v, "date")),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            let mut builder = Time64MicrosecondBuilder::with_capacity(rows.len());
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    Value::Time(t) => builder.append_value(micros_since_midnight(t)),
                    v => return Err(conversion_error(name, &v, "time")),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Timestamp(TimeUnit::Microsecond, tz) => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(rows.len());
            if let Some(tz) = tz {
                builder = builder.with_timezone(Arc::clone(tz));
            }
            for row in rows {
                match value_at(row) {
                    Value::Null => builder.append_null(),
                    Value::DateTime(dt) => builder.append_value(dt.and_utc().timestamp_micros()),
                    Value::DateTimeTz(dt) => builder.append_value(dt.timestamp_micros()),
                    Value::Date(d) => builder
                        .append_value(d.and_time(NaiveTime::MIN).and_utc().timestamp_micros()),
                    v => return Err(conversion_error(name, &v, "timestamp")),
                }
            }
            Arc::new(builder.finish())
        }
        other => {
            return Err(Error::type_conversion(format!(
                "column '{name}': unsupported arrow type {other}"
            )))
        }
    };

    Ok(array)
}

fn decimal_mantissa(name: &str, value: &Value, scale: i8) -> Result<i128> {
    let decimal = match value {
        Value::Decimal(d) => *d,
        Value::Int8(n) => Decimal::from(*n),
        Value::Int16(n) => Decimal::from(*n),
        Value::Int32(n) => Decimal::from(*n),
        Value::Int64(n) => Decimal::from(*n),
        other => return Err(conversion_error(name, other, "decimal")),
    };
    if scale < 0 {
        return Err(Error::type_conversion(format!(
            "column '{name}': negative decimal scale {scale}"
        )));
    }
    let mut scaled = decimal;
    scaled.rescale(scale as u32);
    Ok(scaled.mantissa())
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

fn micros_since_midnight(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * 1_000_000
        + i64::from(time.nanosecond() / 1_000)
}

fn conversion_error(name: &str, value: &Value, target: &str) -> Error {
    Error::type_conversion(format!(
        "column '{name}': cannot convert {value:?} to {target}"
    ))
}
