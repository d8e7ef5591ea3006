//! Type coercion table (spec.md §4.1): maps a `(column-type,
//! source-field-type)` pair plus a raw JSON value to a parsed/validated
//! native value, or a typed error. A missing/null raw value yields
//! `Ok(None)` ("nil-passthrough") so the mapper can append a
//! type-appropriate zero; it is not an error in itself.

use crate::types::{ColumnType, SourceFieldType};
use chrono::{DateTime as ChronoDateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// A coerced, physically-typed value ready to be appended to a
/// [`crate::batch::ColumnarBatch`] column.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Bool(bool),
    Int(i128),
    UInt(u128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    /// Unix seconds.
    DateTime(i64),
    /// (unix seconds, nanoseconds) pair; the column's configured
    /// precision decides how many fractional digits the driver expects.
    DateTime64(i64, u32),
    Array(Vec<CoercedValue>),
    /// String-keyed, string-valued map (spec.md §4.1: "Map(K,V): ...
    /// values coerced to strings").
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Error, PartialEq)]
pub enum CoerceErrorKind {
    #[error("unknown source field type: {0}")]
    UnknownType(String),
    #[error("type mismatch: column expects {expected}, source declared {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("value out of range for {column_type}: {value}")]
    OutOfRange { column_type: String, value: String },
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
    #[error("unsupported enum value: {0}")]
    UnsupportedEnum(String),
}

/// Entry point: coerce `raw` (declared as `source_type`) into the value a
/// `column_type` column expects. `Ok(None)` means `raw` was JSON `null`;
/// the caller appends a zero value for `column_type` instead.
pub fn convert(
    column_type: &ColumnType,
    source_type: SourceFieldType,
    raw: &Value,
) -> Result<Option<CoercedValue>, CoerceErrorKind> {
    if raw.is_null() {
        return Ok(None);
    }
    match column_type {
        ColumnType::Nullable(inner) => convert(inner, source_type, raw),
        ColumnType::LowCardinality(inner) => convert(inner, source_type, raw),
        ColumnType::Bool => {
            require_source(source_type, &[SourceFieldType::Bool], "Bool")?;
            let b = raw
                .as_bool()
                .ok_or_else(|| mismatch("Bool", source_type))?;
            Ok(Some(CoercedValue::Bool(b)))
        }
        ColumnType::Int8 => int_column(source_type, raw, "Int8", i8::MIN as i128, i8::MAX as i128),
        ColumnType::Int16 => int_column(
            source_type,
            raw,
            "Int16",
            i16::MIN as i128,
            i16::MAX as i128,
        ),
        ColumnType::Int32 => int_column(
            source_type,
            raw,
            "Int32",
            i32::MIN as i128,
            i32::MAX as i128,
        ),
        ColumnType::Int64 => int_column(
            source_type,
            raw,
            "Int64",
            i64::MIN as i128,
            i64::MAX as i128,
        ),
        ColumnType::UInt8 => uint_column(source_type, raw, "UInt8", u8::MAX as u128),
        ColumnType::UInt16 => uint_column(source_type, raw, "UInt16", u16::MAX as u128),
        ColumnType::UInt32 => uint_column(source_type, raw, "UInt32", u32::MAX as u128),
        ColumnType::UInt64 => uint_column(source_type, raw, "UInt64", u64::MAX as u128),
        ColumnType::Float32 => {
            require_source(
                source_type,
                &[SourceFieldType::Float, SourceFieldType::Float32],
                "Float32",
            )?;
            let f = extract_f64(raw, "Float32")?;
            if f.abs() > f32::MAX as f64 {
                return Err(CoerceErrorKind::OutOfRange {
                    column_type: "Float32".to_string(),
                    value: f.to_string(),
                });
            }
            Ok(Some(CoercedValue::Float(f)))
        }
        ColumnType::Float64 => {
            require_source(
                source_type,
                &[SourceFieldType::Float, SourceFieldType::Float64],
                "Float64",
            )?;
            Ok(Some(CoercedValue::Float(extract_f64(raw, "Float64")?)))
        }
        ColumnType::String => {
            require_source(
                source_type,
                &[SourceFieldType::String, SourceFieldType::Bytes],
                "String",
            )?;
            match raw {
                Value::String(s) => Ok(Some(CoercedValue::Str(s.clone()))),
                _ => Err(mismatch("String", source_type)),
            }
        }
        ColumnType::FixedString(_) => {
            require_source(source_type, &[SourceFieldType::String], "FixedString")?;
            let s = raw.as_str().ok_or_else(|| mismatch("FixedString", source_type))?;
            Ok(Some(CoercedValue::Str(s.to_string())))
        }
        ColumnType::Enum8 | ColumnType::Enum16 => {
            // Enum columns require an integer source; a string source
            // without an enum-definition mapping is never guessed here.
            match source_type {
                SourceFieldType::Int
                | SourceFieldType::Int8
                | SourceFieldType::Int16
                | SourceFieldType::Int32
                | SourceFieldType::Int64 => {
                    let i = raw.as_i64().ok_or_else(|| mismatch("Enum", source_type))?;
                    Ok(Some(CoercedValue::Int(i as i128)))
                }
                SourceFieldType::String => Err(CoerceErrorKind::UnsupportedEnum(
                    raw.as_str().unwrap_or_default().to_string(),
                )),
                _ => Err(mismatch("Enum", source_type)),
            }
        }
        ColumnType::Uuid => {
            require_source(source_type, &[SourceFieldType::String], "UUID")?;
            let s = raw.as_str().ok_or_else(|| mismatch("UUID", source_type))?;
            let u = Uuid::parse_str(s).map_err(|_| CoerceErrorKind::OutOfRange {
                column_type: "UUID".to_string(),
                value: s.to_string(),
            })?;
            Ok(Some(CoercedValue::Uuid(u)))
        }
        ColumnType::DateTime => coerce_datetime(source_type, raw).map(|(s, _)| Some(CoercedValue::DateTime(s))),
        ColumnType::DateTime64(_, _) => {
            coerce_datetime(source_type, raw).map(|(s, ns)| Some(CoercedValue::DateTime64(s, ns)))
        }
        ColumnType::Array(inner) => coerce_array(inner, source_type, raw),
        ColumnType::Map(_, _) => coerce_map(raw),
    }
}

fn mismatch(expected: &str, actual: SourceFieldType) -> CoerceErrorKind {
    CoerceErrorKind::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn require_source(
    actual: SourceFieldType,
    accepted: &[SourceFieldType],
    expected_label: &str,
) -> Result<(), CoerceErrorKind> {
    if accepted.contains(&actual) {
        Ok(())
    } else {
        Err(mismatch(expected_label, actual))
    }
}

fn extract_i128(raw: &Value, label: &str) -> Result<i128, CoerceErrorKind> {
    raw.as_i64()
        .map(|v| v as i128)
        .or_else(|| raw.as_u64().map(|v| v as i128))
        .ok_or_else(|| CoerceErrorKind::UnsupportedType(label.to_string()))
}

fn extract_f64(raw: &Value, label: &str) -> Result<f64, CoerceErrorKind> {
    raw.as_f64()
        .ok_or_else(|| CoerceErrorKind::UnsupportedType(label.to_string()))
}

fn int_column(
    source_type: SourceFieldType,
    raw: &Value,
    label: &str,
    min: i128,
    max: i128,
) -> Result<Option<CoercedValue>, CoerceErrorKind> {
    let accepted = &[
        SourceFieldType::Int,
        SourceFieldType::Int8,
        SourceFieldType::Int16,
        SourceFieldType::Int32,
        SourceFieldType::Int64,
    ];
    require_source(source_type, accepted, label)?;
    let v = extract_i128(raw, label)?;
    if v < min || v > max {
        return Err(CoerceErrorKind::OutOfRange {
            column_type: label.to_string(),
            value: v.to_string(),
        });
    }
    Ok(Some(CoercedValue::Int(v)))
}

fn uint_column(
    source_type: SourceFieldType,
    raw: &Value,
    label: &str,
    max: u128,
) -> Result<Option<CoercedValue>, CoerceErrorKind> {
    let accepted = &[
        SourceFieldType::Uint,
        SourceFieldType::Uint8,
        SourceFieldType::Uint16,
        SourceFieldType::Uint32,
        SourceFieldType::Uint64,
    ];
    require_source(source_type, accepted, label)?;
    let v = raw
        .as_u64()
        .ok_or_else(|| CoerceErrorKind::UnsupportedType(label.to_string()))? as u128;
    if v > max {
        return Err(CoerceErrorKind::OutOfRange {
            column_type: label.to_string(),
            value: v.to_string(),
        });
    }
    Ok(Some(CoercedValue::UInt(v)))
}

/// Unix-seconds int/float, or string in RFC3339, RFC3339-nano,
/// `YYYY-MM-DD[T ]HH:MM:SS[.fffffff]`, or `YYYY-MM-DD`, tried in that
/// order. Returns `(unix_seconds, fractional_nanos)`.
fn coerce_datetime(source_type: SourceFieldType, raw: &Value) -> Result<(i64, u32), CoerceErrorKind> {
    match source_type {
        SourceFieldType::Int
        | SourceFieldType::Int8
        | SourceFieldType::Int16
        | SourceFieldType::Int32
        | SourceFieldType::Int64
        | SourceFieldType::Uint
        | SourceFieldType::Uint8
        | SourceFieldType::Uint16
        | SourceFieldType::Uint32
        | SourceFieldType::Uint64 => {
            let secs = raw
                .as_i64()
                .or_else(|| raw.as_u64().map(|v| v as i64))
                .ok_or_else(|| CoerceErrorKind::UnsupportedType("DateTime".to_string()))?;
            Ok((secs, 0))
        }
        SourceFieldType::Float | SourceFieldType::Float32 | SourceFieldType::Float64 => {
            let f = raw
                .as_f64()
                .ok_or_else(|| CoerceErrorKind::UnsupportedType("DateTime".to_string()))?;
            let secs = f.trunc() as i64;
            let nanos = (f.fract().abs() * 1_000_000_000.0).round() as u32;
            Ok((secs, nanos))
        }
        SourceFieldType::String => {
            let s = raw
                .as_str()
                .ok_or_else(|| mismatch("DateTime", source_type))?;
            parse_datetime_string(s)
        }
        other => Err(mismatch("DateTime", other)),
    }
}

fn parse_datetime_string(s: &str) -> Result<(i64, u32), CoerceErrorKind> {
    if let Ok(dt) = ChronoDateTime::parse_from_rfc3339(s) {
        return Ok((dt.timestamp(), dt.timestamp_subsec_nanos()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            let dt = ndt.and_utc();
            return Ok((dt.timestamp(), dt.timestamp_subsec_nanos()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let dt = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        return Ok((dt.timestamp(), 0));
    }
    Err(CoerceErrorKind::OutOfRange {
        column_type: "DateTime".to_string(),
        value: s.to_string(),
    })
}

fn coerce_array(
    inner: &ColumnType,
    source_type: SourceFieldType,
    raw: &Value,
) -> Result<Option<CoercedValue>, CoerceErrorKind> {
    if let ColumnType::Map(_, _) = inner {
        let arr = raw
            .as_array()
            .ok_or_else(|| mismatch("Array(Map)", source_type))?;
        let mut out = Vec::with_capacity(arr.len());
        for item in arr {
            match coerce_map(item)? {
                Some(v) => out.push(v),
                None => out.push(CoercedValue::Map(BTreeMap::new())),
            }
        }
        return Ok(Some(CoercedValue::Array(out)));
    }
    if source_type == SourceFieldType::Array {
        let arr = raw.as_array().ok_or_else(|| mismatch("Array", source_type))?;
        let mut out = Vec::with_capacity(arr.len());
        for item in arr {
            if let Some(v) = convert(inner, element_source_type(item), item)? {
                out.push(v);
            }
        }
        Ok(Some(CoercedValue::Array(out)))
    } else {
        // Legacy fallback: marshal as JSON text.
        Ok(Some(CoercedValue::Str(raw.to_string())))
    }
}

fn element_source_type(v: &Value) -> SourceFieldType {
    match v {
        Value::String(_) => SourceFieldType::String,
        Value::Bool(_) => SourceFieldType::Bool,
        Value::Number(n) if n.is_i64() || n.is_u64() => SourceFieldType::Int,
        Value::Number(_) => SourceFieldType::Float,
        Value::Array(_) => SourceFieldType::Array,
        Value::Object(_) => SourceFieldType::Map,
        Value::Null => SourceFieldType::String,
    }
}

/// `Map(K,V)`: must be a JSON object; values are coerced to strings
/// (`%d` for integers, `%g` for floats, `%t` for bools, JSON text for
/// nested structures).
fn coerce_map(raw: &Value) -> Result<Option<CoercedValue>, CoerceErrorKind> {
    let obj = raw
        .as_object()
        .ok_or_else(|| CoerceErrorKind::TypeMismatch {
            expected: "Map".to_string(),
            actual: "non-object".to_string(),
        })?;
    let mut out = BTreeMap::new();
    for (k, v) in obj {
        let s = match v {
            Value::String(s) => s.clone(),
            Value::Number(n) if n.is_i64() => n.as_i64().unwrap().to_string(),
            Value::Number(n) if n.is_u64() => n.as_u64().unwrap().to_string(),
            Value::Number(n) => format!("{}", n.as_f64().unwrap()),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        };
        out.insert(k.clone(), s);
    }
    Ok(Some(CoercedValue::Map(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_accepts_only_bool_source() {
        let r = convert(&ColumnType::Bool, SourceFieldType::Bool, &json!(true)).unwrap();
        assert_eq!(r, Some(CoercedValue::Bool(true)));
        let err = convert(&ColumnType::Bool, SourceFieldType::String, &json!("x")).unwrap_err();
        assert!(matches!(err, CoerceErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn int8_overflow_is_out_of_range() {
        let err = convert(&ColumnType::Int8, SourceFieldType::Int, &json!(200)).unwrap_err();
        assert!(matches!(err, CoerceErrorKind::OutOfRange { .. }));
    }

    #[test]
    fn int8_boundary_values_fit() {
        assert!(convert(&ColumnType::Int8, SourceFieldType::Int, &json!(127)).is_ok());
        assert!(convert(&ColumnType::Int8, SourceFieldType::Int, &json!(-128)).is_ok());
        assert!(convert(&ColumnType::Int8, SourceFieldType::Int, &json!(128)).is_err());
    }

    #[test]
    fn float32_bounds() {
        let within = convert(&ColumnType::Float32, SourceFieldType::Float, &json!(3.14)).unwrap();
        assert!(within.is_some());
        let over = f64::from(f32::MAX) * 2.0;
        let err = convert(&ColumnType::Float32, SourceFieldType::Float, &json!(over)).unwrap_err();
        assert!(matches!(err, CoerceErrorKind::OutOfRange { .. }));
    }

    #[test]
    fn null_is_nil_passthrough() {
        let r = convert(&ColumnType::Int32, SourceFieldType::Int, &Value::Null).unwrap();
        assert_eq!(r, None);
    }

    #[test]
    fn datetime_from_unix_seconds() {
        let r = convert(&ColumnType::DateTime, SourceFieldType::Int, &json!(1_700_000_000)).unwrap();
        assert_eq!(r, Some(CoercedValue::DateTime(1_700_000_000)));
    }

    #[test]
    fn datetime_from_rfc3339_string() {
        let r = convert(
            &ColumnType::DateTime,
            SourceFieldType::String,
            &json!("2023-11-14T22:13:20Z"),
        )
        .unwrap();
        assert_eq!(r, Some(CoercedValue::DateTime(1_700_000_000)));
    }

    #[test]
    fn datetime_from_date_only_string() {
        let r = convert(&ColumnType::DateTime, SourceFieldType::String, &json!("2023-11-14")).unwrap();
        assert!(matches!(r, Some(CoercedValue::DateTime(_))));
    }

    #[test]
    fn datetime64_keeps_fractional_nanos() {
        let r = convert(&ColumnType::DateTime64(3, None), SourceFieldType::Float, &json!(1.5)).unwrap();
        assert_eq!(r, Some(CoercedValue::DateTime64(1, 500_000_000)));
    }

    #[test]
    fn uuid_string_parses() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        let r = convert(&ColumnType::Uuid, SourceFieldType::String, &json!(id)).unwrap();
        assert_eq!(r, Some(CoercedValue::Uuid(Uuid::parse_str(id).unwrap())));
    }

    #[test]
    fn enum_requires_int_source() {
        let err = convert(&ColumnType::Enum8, SourceFieldType::String, &json!("RED")).unwrap_err();
        assert!(matches!(err, CoerceErrorKind::UnsupportedEnum(_)));
        let ok = convert(&ColumnType::Enum8, SourceFieldType::Int, &json!(1)).unwrap();
        assert_eq!(ok, Some(CoercedValue::Int(1)));
    }

    #[test]
    fn map_values_coerced_to_strings() {
        let r = coerce_map(&json!({"a": 1, "b": "x", "c": true})).unwrap().unwrap();
        match r {
            CoercedValue::Map(m) => {
                assert_eq!(m.get("a").unwrap(), "1");
                assert_eq!(m.get("b").unwrap(), "x");
                assert_eq!(m.get("c").unwrap(), "true");
            }
            _ => panic!("expected map"),
        }
    }

    #[test]
    fn array_of_primitives_passes_through() {
        let r = convert(
            &ColumnType::Array(Box::new(ColumnType::Int32)),
            SourceFieldType::Array,
            &json!([1, 2, 3]),
        )
        .unwrap();
        assert_eq!(
            r,
            Some(CoercedValue::Array(vec![
                CoercedValue::Int(1),
                CoercedValue::Int(2),
                CoercedValue::Int(3)
            ]))
        );
    }

    #[test]
    fn non_array_source_for_array_column_falls_back_to_json_text() {
        let r = convert(
            &ColumnType::Array(Box::new(ColumnType::Int32)),
            SourceFieldType::String,
            &json!("not-an-array"),
        )
        .unwrap();
        assert!(matches!(r, Some(CoercedValue::Str(_))));
    }
}
