//! Columnar batch (spec.md §4.3): a vector of typed columns in
//! sink-mapping order, a row counter, and an optional row-level
//! deduplication key set. Append-only; reset between flushes; exclusive
//! ownership by a single producer thread (spec.md §5).

use crate::coerce::CoercedValue;
use crate::error::RowError;
use crate::types::ColumnType;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One physically-typed column vector. `Uuid` and `UuidAsString` are kept
/// distinct because the mapper decides which to build at batch
/// construction time by inspecting the declared physical column kind,
/// preserving a historical database-driver behaviour that allowed UUID
/// columns to be declared as strings (spec.md §4.3, §9).
#[derive(Debug, Clone)]
pub enum Column {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(Vec<String>),
    FixedString(usize, Vec<String>),
    LowCardinalityString(Vec<String>),
    Enum8(Vec<i8>),
    Enum16(Vec<i16>),
    DateTime(Vec<i64>),
    /// `(precision, timezone)` from the configured column type, values as
    /// `(unix_seconds, nanos)`.
    DateTime64(u8, Option<String>, Vec<(i64, u32)>),
    Uuid(Vec<Uuid>),
    UuidAsString(Vec<String>),
    Array(Box<ColumnType>, Vec<Vec<CoercedValue>>),
    Map(Vec<BTreeMap<String, String>>),
}

impl Column {
    /// Build an empty column of the physical shape implied by
    /// `column_type`. `uuid_as_string` is decided by the mapper from the
    /// sink's physical schema metadata (out of core scope) and only
    /// matters for `ColumnType::Uuid`.
    pub fn empty_for(column_type: &ColumnType, uuid_as_string: bool) -> Column {
        match column_type {
            ColumnType::Bool => Column::Bool(Vec::new()),
            ColumnType::Int8 => Column::Int8(Vec::new()),
            ColumnType::Int16 => Column::Int16(Vec::new()),
            ColumnType::Int32 => Column::Int32(Vec::new()),
            ColumnType::Int64 => Column::Int64(Vec::new()),
            ColumnType::UInt8 => Column::UInt8(Vec::new()),
            ColumnType::UInt16 => Column::UInt16(Vec::new()),
            ColumnType::UInt32 => Column::UInt32(Vec::new()),
            ColumnType::UInt64 => Column::UInt64(Vec::new()),
            ColumnType::Float32 => Column::Float32(Vec::new()),
            ColumnType::Float64 => Column::Float64(Vec::new()),
            ColumnType::String => Column::String(Vec::new()),
            ColumnType::FixedString(n) => Column::FixedString(*n, Vec::new()),
            ColumnType::Enum8 => Column::Enum8(Vec::new()),
            ColumnType::Enum16 => Column::Enum16(Vec::new()),
            ColumnType::DateTime => Column::DateTime(Vec::new()),
            ColumnType::DateTime64(p, tz) => Column::DateTime64(*p, tz.clone(), Vec::new()),
            ColumnType::Uuid => {
                if uuid_as_string {
                    Column::UuidAsString(Vec::new())
                } else {
                    Column::Uuid(Vec::new())
                }
            }
            ColumnType::Array(inner) => Column::Array(inner.clone(), Vec::new()),
            ColumnType::Map(_, _) => Column::Map(Vec::new()),
            ColumnType::LowCardinality(inner) => {
                if matches!(inner.as_ref(), ColumnType::String | ColumnType::FixedString(_)) {
                    Column::LowCardinalityString(Vec::new())
                } else {
                    Column::empty_for(inner, uuid_as_string)
                }
            }
            ColumnType::Nullable(inner) => Column::empty_for(inner, uuid_as_string),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int8(v) => v.len(),
            Column::Int16(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::UInt8(v) => v.len(),
            Column::UInt16(v) => v.len(),
            Column::UInt32(v) => v.len(),
            Column::UInt64(v) => v.len(),
            Column::Float32(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::String(v) => v.len(),
            Column::FixedString(_, v) => v.len(),
            Column::LowCardinalityString(v) => v.len(),
            Column::Enum8(v) => v.len(),
            Column::Enum16(v) => v.len(),
            Column::DateTime(v) => v.len(),
            Column::DateTime64(_, _, v) => v.len(),
            Column::Uuid(v) => v.len(),
            Column::UuidAsString(v) => v.len(),
            Column::Array(_, v) => v.len(),
            Column::Map(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self) {
        match self {
            Column::Bool(v) => v.clear(),
            Column::Int8(v) => v.clear(),
            Column::Int16(v) => v.clear(),
            Column::Int32(v) => v.clear(),
            Column::Int64(v) => v.clear(),
            Column::UInt8(v) => v.clear(),
            Column::UInt16(v) => v.clear(),
            Column::UInt32(v) => v.clear(),
            Column::UInt64(v) => v.clear(),
            Column::Float32(v) => v.clear(),
            Column::Float64(v) => v.clear(),
            Column::String(v) => v.clear(),
            Column::FixedString(_, v) => v.clear(),
            Column::LowCardinalityString(v) => v.clear(),
            Column::Enum8(v) => v.clear(),
            Column::Enum16(v) => v.clear(),
            Column::DateTime(v) => v.clear(),
            Column::DateTime64(_, _, v) => v.clear(),
            Column::Uuid(v) => v.clear(),
            Column::UuidAsString(v) => v.clear(),
            Column::Array(_, v) => v.clear(),
            Column::Map(v) => v.clear(),
        }
    }

    /// Append `value` (or a type-appropriate zero when `None`) into this
    /// column. `column_name` is only used to label errors.
    pub fn append(&mut self, value: Option<CoercedValue>, column_name: &str) -> Result<(), RowError> {
        macro_rules! push_int {
            ($vec:expr, $ty:ty, $label:literal) => {
                match value {
                    None => $vec.push(0 as $ty),
                    Some(CoercedValue::Int(i)) => $vec.push(i as $ty),
                    Some(CoercedValue::UInt(u)) => $vec.push(u as $ty),
                    _ => {
                        return Err(RowError::TypeMismatch {
                            column: column_name.to_string(),
                            expected: $label.to_string(),
                            actual: "non-integer".to_string(),
                        })
                    }
                }
            };
        }
        match self {
            Column::Bool(v) => match value {
                None => v.push(false),
                Some(CoercedValue::Bool(b)) => v.push(b),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "Bool".to_string(),
                        actual: "non-bool".to_string(),
                    })
                }
            },
            Column::Int8(v) => push_int!(v, i8, "Int8"),
            Column::Int16(v) => push_int!(v, i16, "Int16"),
            Column::Int32(v) => push_int!(v, i32, "Int32"),
            Column::Int64(v) => push_int!(v, i64, "Int64"),
            Column::UInt8(v) => push_int!(v, u8, "UInt8"),
            Column::UInt16(v) => push_int!(v, u16, "UInt16"),
            Column::UInt32(v) => push_int!(v, u32, "UInt32"),
            Column::UInt64(v) => push_int!(v, u64, "UInt64"),
            Column::Enum8(v) => push_int!(v, i8, "Enum8"),
            Column::Enum16(v) => push_int!(v, i16, "Enum16"),
            Column::Float32(v) => match value {
                None => v.push(0.0),
                Some(CoercedValue::Float(f)) => v.push(f as f32),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "Float32".to_string(),
                        actual: "non-float".to_string(),
                    })
                }
            },
            Column::Float64(v) => match value {
                None => v.push(0.0),
                Some(CoercedValue::Float(f)) => v.push(f),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "Float64".to_string(),
                        actual: "non-float".to_string(),
                    })
                }
            },
            Column::String(v) | Column::LowCardinalityString(v) | Column::FixedString(_, v) => {
                match value {
                    None => v.push(String::new()),
                    Some(CoercedValue::Str(s)) => v.push(s),
                    Some(CoercedValue::Bytes(b)) => v.push(String::from_utf8_lossy(&b).into_owned()),
                    _ => {
                        return Err(RowError::TypeMismatch {
                            column: column_name.to_string(),
                            expected: "String".to_string(),
                            actual: "non-string".to_string(),
                        })
                    }
                }
            }
            Column::DateTime(v) => match value {
                None => v.push(0),
                Some(CoercedValue::DateTime(s)) => v.push(s),
                Some(CoercedValue::DateTime64(s, _)) => v.push(s),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "DateTime".to_string(),
                        actual: "non-datetime".to_string(),
                    })
                }
            },
            Column::DateTime64(_, _, v) => match value {
                None => v.push((0, 0)),
                Some(CoercedValue::DateTime64(s, ns)) => v.push((s, ns)),
                Some(CoercedValue::DateTime(s)) => v.push((s, 0)),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "DateTime64".to_string(),
                        actual: "non-datetime".to_string(),
                    })
                }
            },
            Column::Uuid(v) => match value {
                None => v.push(Uuid::nil()),
                Some(CoercedValue::Uuid(u)) => v.push(u),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "UUID".to_string(),
                        actual: "non-uuid".to_string(),
                    })
                }
            },
            // Physical column is String-typed but logically a UUID: the
            // bytes are appended verbatim, never parsed/validated.
            Column::UuidAsString(v) => match value {
                None => v.push(String::new()),
                Some(CoercedValue::Uuid(u)) => v.push(u.to_string()),
                Some(CoercedValue::Str(s)) => v.push(s),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "UUID-as-String".to_string(),
                        actual: "non-string".to_string(),
                    })
                }
            },
            Column::Array(inner, v) => match value {
                None => v.push(Vec::new()),
                Some(CoercedValue::Array(items)) => v.push(items),
                _ => {
                    let _ = inner;
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "Array".to_string(),
                        actual: "non-array".to_string(),
                    });
                }
            },
            Column::Map(v) => match value {
                None => v.push(BTreeMap::new()),
                Some(CoercedValue::Map(m)) => v.push(m),
                _ => {
                    return Err(RowError::TypeMismatch {
                        column: column_name.to_string(),
                        expected: "Map".to_string(),
                        actual: "non-map".to_string(),
                    })
                }
            },
        }
        Ok(())
    }
}

/// The columnar batch itself: typed columns in sink-mapping order, a row
/// counter, and an optional dedup-key set. Created once per target table;
/// reset between flushes; destroyed on pipeline teardown.
pub struct ColumnarBatch {
    column_names: Vec<String>,
    columns: Vec<Column>,
    row_count: usize,
    dedup_ids: Option<HashSet<String>>,
}

impl ColumnarBatch {
    pub fn new(column_names: Vec<String>, columns: Vec<Column>, dedup: bool) -> Self {
        Self {
            column_names,
            columns,
            row_count: 0,
            dedup_ids: if dedup { Some(HashSet::new()) } else { None },
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Column type access so the mapper can dispatch on whether a
    /// string-typed physical column underlies a logical UUID (and
    /// analogously for LowCardinality wrappers), spec.md §4.3.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn size(&self) -> usize {
        self.row_count
    }

    pub fn increment_row_count(&mut self) {
        self.row_count += 1;
    }

    /// Truncates every column in place and clears the dedup-key set;
    /// capacity is retained.
    pub fn reset(&mut self) {
        for col in &mut self.columns {
            col.clear();
        }
        self.row_count = 0;
        if let Some(ids) = &mut self.dedup_ids {
            ids.clear();
        }
    }

    pub fn has_id(&self, key: &str) -> bool {
        self.dedup_ids.as_ref().is_some_and(|s| s.contains(key))
    }

    pub fn add_id(&mut self, key: String) {
        if let Some(ids) = &mut self.dedup_ids {
            ids.insert(key);
        }
    }
}

/// The boundary to the external columnar-database driver (spec.md §4.3,
/// §4.7). The core neither assumes success nor a timeout beyond the
/// cancellation token. `send` may block on I/O and is the only
/// cancellable step in the mapper's otherwise synchronous hot path.
#[async_trait]
pub trait ColumnSink: Send + Sync {
    async fn send(&self, batch: &ColumnarBatch, cancel: &CancellationToken) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_rows_and_dedup_but_keeps_columns() {
        let mut batch = ColumnarBatch::new(
            vec!["c1".to_string()],
            vec![Column::Int32(Vec::new())],
            true,
        );
        batch.columns_mut()[0].append(Some(CoercedValue::Int(1)), "c1").unwrap();
        batch.increment_row_count();
        batch.add_id("k1".to_string());
        assert_eq!(batch.size(), 1);
        assert!(batch.has_id("k1"));
        batch.reset();
        assert_eq!(batch.size(), 0);
        assert!(!batch.has_id("k1"));
        assert_eq!(batch.columns()[0].len(), 0);
    }

    #[test]
    fn missing_value_appends_zero() {
        let mut col = Column::Int32(Vec::new());
        col.append(None, "c").unwrap();
        match col {
            Column::Int32(v) => assert_eq!(v, vec![0]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn uuid_as_string_appends_verbatim() {
        let mut col = Column::UuidAsString(Vec::new());
        col.append(Some(CoercedValue::Str("not-a-valid-uuid".to_string())), "c")
            .unwrap();
        match col {
            Column::UuidAsString(v) => assert_eq!(v, vec!["not-a-valid-uuid".to_string()]),
            _ => unreachable!(),
        }
    }
}
