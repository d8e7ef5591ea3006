//! Error taxonomy for the mapping engine (spec.md §7): per-row input
//! errors, compile-time config errors, lifecycle errors, and internal
//! invariant violations. Each family is its own enum so callers can match
//! on exactly the errors relevant to their boundary.

use thiserror::Error;

/// Per-row failures (spec.md §7 "Input errors"). Never crash the process;
/// the caller routes these to a dead-letter channel.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("column {column}: field missing")]
    FieldMissing { column: String },
    #[error("column {column}: type mismatch, expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
    #[error("column {column}: value {value} out of range")]
    OutOfRange { column: String, value: String },
    #[error("column {column}: array index {index} out of bounds")]
    ArrayOutOfBounds { column: String, index: i64 },
    #[error("column {column}: unsupported enum value {value}")]
    UnsupportedEnum { column: String, value: String },
    #[error("column {column}: unsupported column type {column_type}")]
    UnsupportedType { column: String, column_type: String },
}

impl RowError {
    pub fn column(&self) -> &str {
        match self {
            RowError::FieldMissing { column }
            | RowError::TypeMismatch { column, .. }
            | RowError::OutOfRange { column, .. }
            | RowError::ArrayOutOfBounds { column, .. }
            | RowError::UnsupportedEnum { column, .. }
            | RowError::UnsupportedType { column, .. } => column,
            RowError::InvalidJson(_) => "",
        }
    }
}

/// Mapper-construction failures (spec.md §7 "Config errors"). Surfaced at
/// mapper compile time; the pipeline cannot start.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sink mapping column {column}: unknown stream {stream}")]
    UnknownStream { column: String, stream: String },
    #[error("sink mapping column {column}: unknown field {field} in stream {stream}")]
    UnknownField {
        column: String,
        stream: String,
        field: String,
    },
    #[error("stream {stream}: invalid join key field {field}")]
    InvalidJoinKey { stream: String, field: String },
    #[error("sink mapping column {column}: Nullable column types are rejected in columnar mode")]
    NullableRejected { column: String },
    #[error("duplicate column name: {0}")]
    DuplicateColumnName(String),
    #[error("mapper config has no streams")]
    EmptyStreams,
    #[error("mapper config has no sink-mapping columns")]
    EmptyColumns,
    #[error("joins require exactly two streams, found {0}")]
    WrongJoinStreamCount(usize),
    #[error("at most one stream may be {orientation:?}-oriented, found {count}")]
    DuplicateOrientation {
        orientation: crate::schema::JoinOrientation,
        count: usize,
    },
    #[error("column type parse error: {0}")]
    ColumnType(#[from] crate::types::ColumnTypeParseError),
}

/// Non-recoverable invariant violations (spec.md §7). These are fatal to
/// the affected pipeline only; callers are expected to log and terminate.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("stream {stream}: ordered-column-index length {indexed} does not match GetOrderedColumnsStream length {expected}")]
    ColumnIndexMismatch {
        stream: String,
        indexed: usize,
        expected: usize,
    },
    #[error("unknown stream at runtime: {0}")]
    UnknownStreamAtRuntime(String),
}

/// Top-level error returned by `Mapper::append_to_columns` and friends:
/// either a per-row failure or a non-recoverable invariant violation.
#[derive(Debug, Error)]
pub enum MapperRuntimeError {
    #[error(transparent)]
    Row(#[from] RowError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
