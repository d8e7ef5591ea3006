//! The `Mapper`: compiled once from a [`MapperConfig`], then run once per
//! inbound message on the hot path (spec.md §4.4). Grounded on the
//! teacher's `TopicMappingManager` (`rde-io/src/topic_mapping.rs`): same
//! "compile once, cache lookup maps, run per message" shape, and the same
//! philosophy its own doc comment calls out for direct Kafka→Iceberg
//! streaming, bypassing the generic `Transform`/`Sink` operator DAG
//! entirely for the mapping hot path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::batch::{Column, ColumnarBatch};
use crate::coerce::{self, CoercedValue};
use crate::error::{ConfigError, InvariantError, MapperRuntimeError, RowError};
use crate::json_path::{self, PathPart};
use crate::parser_pool::ParserPool;
use crate::schema::{JoinOrientation, MapperConfig, StreamSchema};
use crate::types::ColumnType;

/// Bounded free-list size for a compiled mapper's [`ParserPool`]. Sized for
/// a handful of concurrent callers sharing one `Mapper`, not per-partition
/// parallelism; contention beyond this just falls back to a fresh `Vec`.
const PARSER_POOL_CAPACITY: usize = 16;

/// One sink-mapping column, compiled: its parsed [`ColumnType`] and
/// pre-split lookup path cached so the runtime walk never re-parses a
/// string.
#[derive(Debug, Clone)]
struct CompiledColumn {
    column_name: String,
    stream_name: String,
    field_name: String,
    column_type: ColumnType,
    /// The key tried first, and the string [`path_parts`] was split from.
    /// Plain `field_name` for single-stream mappers; `"<stream>.<field>"`
    /// for multi-stream (joined) mappers, matching the flat keys the join
    /// payload writer emits.
    lookup_key: String,
    path_parts: Vec<PathPart>,
}

/// A compiled mapper: ready to append rows to a [`ColumnarBatch`] or
/// produce an equivalent boxed-value sequence, without touching the
/// config or re-parsing column types again.
pub struct Mapper {
    streams: HashMap<String, StreamSchema>,
    columns: Vec<CompiledColumn>,
    /// `column_name` → index into `columns` / a batch's column vector.
    column_order_map: HashMap<String, usize>,
    /// `stream_name` → ordered indices of the columns sourced from it.
    stream_column_indices: HashMap<String, Vec<usize>>,
    multi_stream: bool,
    left_stream: Option<String>,
    right_stream: Option<String>,
    parser_pool: Arc<ParserPool>,
}

impl Mapper {
    /// Compile a [`MapperConfig`] into a [`Mapper`], validating every
    /// invariant in spec.md §4.4 up front so a bad config never reaches
    /// the hot path. Which sink columns carry a UUID-as-string physical
    /// type (spec.md §4.3, §9) is decided later, per batch, via
    /// [`Mapper::new_batch`], since it depends on the sink's schema
    /// introspection (out of core scope), not on the mapper config itself.
    pub fn compile(config: &MapperConfig) -> Result<Mapper, ConfigError> {
        if config.streams.is_empty() {
            return Err(ConfigError::EmptyStreams);
        }
        if config.sink_mapping.is_empty() {
            return Err(ConfigError::EmptyColumns);
        }

        let left_streams: Vec<&String> = config
            .streams
            .iter()
            .filter(|(_, s)| s.join_orientation == Some(JoinOrientation::Left))
            .map(|(name, _)| name)
            .collect();
        let right_streams: Vec<&String> = config
            .streams
            .iter()
            .filter(|(_, s)| s.join_orientation == Some(JoinOrientation::Right))
            .map(|(name, _)| name)
            .collect();
        if left_streams.len() > 1 {
            return Err(ConfigError::DuplicateOrientation {
                orientation: JoinOrientation::Left,
                count: left_streams.len(),
            });
        }
        if right_streams.len() > 1 {
            return Err(ConfigError::DuplicateOrientation {
                orientation: JoinOrientation::Right,
                count: right_streams.len(),
            });
        }
        let has_join = !left_streams.is_empty() || !right_streams.is_empty();
        if has_join && config.streams.len() != 2 {
            return Err(ConfigError::WrongJoinStreamCount(config.streams.len()));
        }

        for (stream_name, stream) in &config.streams {
            if let Some(key) = &stream.join_key_field {
                if !stream.has_field(key) {
                    return Err(ConfigError::InvalidJoinKey {
                        stream: stream_name.clone(),
                        field: key.clone(),
                    });
                }
            }
        }

        let multi_stream = config.streams.len() > 1;

        let mut seen_columns = HashSet::new();
        let mut columns = Vec::with_capacity(config.sink_mapping.len());
        for entry in &config.sink_mapping {
            if !seen_columns.insert(entry.column_name.clone()) {
                return Err(ConfigError::DuplicateColumnName(entry.column_name.clone()));
            }
            let stream = config.streams.get(&entry.stream_name).ok_or_else(|| {
                ConfigError::UnknownStream {
                    column: entry.column_name.clone(),
                    stream: entry.stream_name.clone(),
                }
            })?;
            if !stream.has_field(&entry.field_name) {
                return Err(ConfigError::UnknownField {
                    column: entry.column_name.clone(),
                    stream: entry.stream_name.clone(),
                    field: entry.field_name.clone(),
                });
            }
            let column_type = ColumnType::parse(&entry.column_type)?;
            if column_type.is_nullable() {
                return Err(ConfigError::NullableRejected {
                    column: entry.column_name.clone(),
                });
            }
            let lookup_key = if multi_stream {
                format!("{}.{}", entry.stream_name, entry.field_name)
            } else {
                entry.field_name.clone()
            };
            let path_parts = PathPart::split(&lookup_key);
            columns.push(CompiledColumn {
                column_name: entry.column_name.clone(),
                stream_name: entry.stream_name.clone(),
                field_name: entry.field_name.clone(),
                column_type,
                lookup_key,
                path_parts,
            });
        }

        let mut column_order_map = HashMap::with_capacity(columns.len());
        let mut stream_column_indices: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, col) in columns.iter().enumerate() {
            column_order_map.insert(col.column_name.clone(), idx);
            stream_column_indices
                .entry(col.stream_name.clone())
                .or_default()
                .push(idx);
        }

        Ok(Mapper {
            streams: config.streams.clone(),
            columns,
            column_order_map,
            stream_column_indices,
            multi_stream,
            left_stream: left_streams.first().map(|s| s.to_string()),
            right_stream: right_streams.first().map(|s| s.to_string()),
            parser_pool: ParserPool::new(PARSER_POOL_CAPACITY),
        })
    }

    pub fn is_multi_stream(&self) -> bool {
        self.multi_stream
    }

    pub fn left_stream(&self) -> Option<&str> {
        self.left_stream.as_deref()
    }

    pub fn right_stream(&self) -> Option<&str> {
        self.right_stream.as_deref()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column_name.as_str()).collect()
    }

    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        self.column_order_map.get(column_name).copied()
    }

    /// The ordered column names sourced from `stream`, in batch order.
    /// Testable property: for every declared stream, these are exactly
    /// the names at `stream_column_indices[stream]`.
    pub fn ordered_columns_for_stream(&self, stream: &str) -> Vec<&str> {
        self.stream_column_indices
            .get(stream)
            .into_iter()
            .flatten()
            .map(|&idx| self.columns[idx].column_name.as_str())
            .collect()
    }

    /// Build a fresh [`ColumnarBatch`] sized for this mapper's columns,
    /// in sink-mapping order.
    pub fn new_batch(&self, uuid_as_string_columns: &HashSet<String>, dedup: bool) -> ColumnarBatch {
        let names = self.columns.iter().map(|c| c.column_name.clone()).collect();
        let cols = self
            .columns
            .iter()
            .map(|c| {
                Column::empty_for(
                    &c.column_type,
                    uuid_as_string_columns.contains(&c.column_name),
                )
            })
            .collect();
        ColumnarBatch::new(names, cols, dedup)
    }

    /// Runtime: `AppendToColumns(stream, bytes, batch)` (spec.md §4.4).
    /// parse `bytes` once, resolve every sink-mapping column's value
    /// against it (flat-key-first, then dotted walk), coerce, and append
    /// into `batch`. For multi-stream (joined) mappers `bytes` is the
    /// already-combined payload from [`join_data`] carrying flat
    /// `"<stream>.<field>"` keys for both sides, so every column is
    /// resolved in the same call regardless of which stream it was
    /// originally declared against. `stream` only needs to name a known
    /// stream; it gates the defensive invariant check in step 2.
    pub fn append_to_columns(
        &self,
        stream: &str,
        bytes: &[u8],
        batch: &mut ColumnarBatch,
    ) -> Result<(), MapperRuntimeError> {
        let indices = self
            .stream_column_indices
            .get(stream)
            .ok_or_else(|| InvariantError::UnknownStreamAtRuntime(stream.to_string()))?;
        let expected = self.ordered_columns_for_stream(stream).len();
        if indices.len() != expected {
            return Err(InvariantError::ColumnIndexMismatch {
                stream: stream.to_string(),
                indexed: indices.len(),
                expected,
            }
            .into());
        }

        let root = self.parse_pooled(bytes)?;

        let columns = batch.columns_mut();
        for col in &self.columns {
            let value = self.resolve_and_coerce(&root, col)?;
            let idx = self.column_order_map[&col.column_name];
            columns[idx]
                .append(value, &col.column_name)
                .map_err(MapperRuntimeError::from)?;
        }
        batch.increment_row_count();
        Ok(())
    }

    /// Alternate contract (spec.md §4.4): returns a boxed value sequence
    /// indexed by sink-mapping order, rather than appending into a
    /// columnar batch. Used on legacy paths that don't carry a batch.
    pub fn prepare_values(&self, bytes: &[u8]) -> Result<Vec<Option<CoercedValue>>, MapperRuntimeError> {
        let root = self.parse_pooled(bytes)?;
        self.columns
            .iter()
            .map(|col| self.resolve_and_coerce(&root, col))
            .collect()
    }

    /// Same as [`Mapper::prepare_values`] but validates `stream` is known
    /// first, mirroring [`Mapper::append_to_columns`]'s stream-scoped
    /// contract.
    pub fn prepare_values_stream(
        &self,
        stream: &str,
        bytes: &[u8],
    ) -> Result<Vec<Option<CoercedValue>>, MapperRuntimeError> {
        if !self.stream_column_indices.contains_key(stream) {
            return Err(InvariantError::UnknownStreamAtRuntime(stream.to_string()).into());
        }
        self.prepare_values(bytes)
    }

    /// Acquire a pooled scratch buffer, copy `bytes` into it, and parse
    /// from the buffer (spec.md §4.4 runtime step 1; §5, §9 "parser
    /// pooling"). The buffer is released back to the pool when it drops
    /// at the end of this call; `serde_json::from_slice` still builds an
    /// owned `Value` tree, but the byte copy itself reuses pooled
    /// capacity instead of allocating a fresh `Vec` per message.
    fn parse_pooled(&self, bytes: &[u8]) -> Result<Value, MapperRuntimeError> {
        let mut guard = self.parser_pool.acquire();
        let buf = guard.get_mut();
        buf.clear();
        buf.extend_from_slice(bytes);
        serde_json::from_slice(buf).map_err(|e| RowError::InvalidJson(e.to_string()).into())
    }

    fn resolve_and_coerce(
        &self,
        root: &Value,
        col: &CompiledColumn,
    ) -> Result<Option<CoercedValue>, MapperRuntimeError> {
        let found = json_path::get_nested_value(root, &col.lookup_key, &col.path_parts).map_err(
            |json_path::TraversalError::OutOfBounds { index, .. }| RowError::ArrayOutOfBounds {
                column: col.column_name.clone(),
                index,
            },
        )?;
        let raw = match found {
            Some(v) => v,
            None => return Ok(None),
        };
        let source_type = self
            .streams
            .get(&col.stream_name)
            .and_then(|s| s.field_type(&col.field_name))
            .ok_or_else(|| InvariantError::UnknownStreamAtRuntime(col.stream_name.clone()))?;
        coerce::convert(&col.column_type, source_type, raw)
            .map_err(|e| row_error_for(&col.column_name, e).into())
    }
}

/// Map a [`coerce::CoerceErrorKind`] onto its matching [`RowError`] variant
/// (spec.md §7: OutOfRange, UnsupportedEnum, and UnsupportedType are
/// distinct input errors, not a generic type mismatch).
fn row_error_for(column: &str, err: coerce::CoerceErrorKind) -> RowError {
    match err {
        coerce::CoerceErrorKind::OutOfRange { value, .. } => RowError::OutOfRange {
            column: column.to_string(),
            value,
        },
        coerce::CoerceErrorKind::UnsupportedEnum(value) => RowError::UnsupportedEnum {
            column: column.to_string(),
            value,
        },
        coerce::CoerceErrorKind::UnsupportedType(column_type) => RowError::UnsupportedType {
            column: column.to_string(),
            column_type,
        },
        coerce::CoerceErrorKind::UnknownType(column_type) => RowError::UnsupportedType {
            column: column.to_string(),
            column_type,
        },
        coerce::CoerceErrorKind::TypeMismatch { expected, actual } => RowError::TypeMismatch {
            column: column.to_string(),
            expected,
            actual,
        },
    }
}

/// Join payload writer (spec.md §4.6): extract every field declared in
/// each side's stream schema from its own raw bytes, and emit a single
/// flat JSON object keyed `"<stream>.<field>"` for both sides combined.
/// Declared-but-absent fields are simply omitted, matching the
/// mapper's own missing-field semantics.
pub fn join_data(
    left_stream: &str,
    left_schema: &StreamSchema,
    left_bytes: &[u8],
    right_stream: &str,
    right_schema: &StreamSchema,
    right_bytes: &[u8],
) -> Result<Vec<u8>, RowError> {
    let left_root: Value =
        serde_json::from_slice(left_bytes).map_err(|e| RowError::InvalidJson(e.to_string()))?;
    let right_root: Value =
        serde_json::from_slice(right_bytes).map_err(|e| RowError::InvalidJson(e.to_string()))?;

    let mut combined = serde_json::Map::new();
    extract_fields_into(left_stream, left_schema, &left_root, &mut combined);
    extract_fields_into(right_stream, right_schema, &right_root, &mut combined);

    serde_json::to_vec(&Value::Object(combined)).map_err(|e| RowError::InvalidJson(e.to_string()))
}

fn extract_fields_into(
    stream_name: &str,
    schema: &StreamSchema,
    root: &Value,
    out: &mut serde_json::Map<String, Value>,
) {
    for field in &schema.fields {
        let parts = PathPart::split(&field.field_name);
        if let Ok(Some(v)) = json_path::get_nested_value(root, &field.field_name, &parts) {
            out.insert(format!("{}.{}", stream_name, field.field_name), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, SinkMappingEntry};
    use crate::types::SourceFieldType;

    fn simple_stream() -> StreamSchema {
        StreamSchema {
            fields: vec![
                FieldSpec {
                    field_name: "id".to_string(),
                    field_type: SourceFieldType::Int,
                },
                FieldSpec {
                    field_name: "name".to_string(),
                    field_type: SourceFieldType::String,
                },
            ],
            join_key_field: None,
            join_orientation: None,
            join_window: None,
        }
    }

    fn single_stream_config() -> MapperConfig {
        let mut streams = HashMap::new();
        streams.insert("S".to_string(), simple_stream());
        MapperConfig {
            r#type: "jsonToClickhouse".to_string(),
            streams,
            sink_mapping: vec![
                SinkMappingEntry {
                    column_name: "id".to_string(),
                    stream_name: "S".to_string(),
                    field_name: "id".to_string(),
                    column_type: "Int32".to_string(),
                },
                SinkMappingEntry {
                    column_name: "name".to_string(),
                    stream_name: "S".to_string(),
                    field_name: "name".to_string(),
                    column_type: "String".to_string(),
                },
            ],
        }
    }

    #[test]
    fn scenario_1_simple_row() {
        let cfg = single_stream_config();
        let mapper = Mapper::compile(&cfg).unwrap();
        let mut batch = mapper.new_batch(&HashSet::new(), false);
        mapper
            .append_to_columns("S", br#"{"id": 1, "name": "a"}"#, &mut batch)
            .unwrap();
        assert_eq!(batch.size(), 1);
        match &batch.columns()[0] {
            Column::Int32(v) => assert_eq!(v, &vec![1]),
            _ => panic!("expected Int32"),
        }
        match &batch.columns()[1] {
            Column::String(v) => assert_eq!(v, &vec!["a".to_string()]),
            _ => panic!("expected String"),
        }
    }

    #[test]
    fn scenario_2_missing_field_appends_zero() {
        let cfg = single_stream_config();
        let mapper = Mapper::compile(&cfg).unwrap();
        let mut batch = mapper.new_batch(&HashSet::new(), false);
        mapper
            .append_to_columns("S", br#"{"id": 1}"#, &mut batch)
            .unwrap();
        match &batch.columns()[1] {
            Column::String(v) => assert_eq!(v, &vec![String::new()]),
            _ => panic!("expected String"),
        }
    }

    #[test]
    fn scenario_3_int_overflow_is_row_error() {
        let mut cfg = single_stream_config();
        cfg.sink_mapping[0].column_type = "Int8".to_string();
        let mapper = Mapper::compile(&cfg).unwrap();
        let mut batch = mapper.new_batch(&HashSet::new(), false);
        let err = mapper
            .append_to_columns("S", br#"{"id": 1000, "name": "a"}"#, &mut batch)
            .unwrap_err();
        assert!(matches!(err, MapperRuntimeError::Row(RowError::OutOfRange { .. })));
    }

    #[test]
    fn append_to_columns_reuses_pooled_buffer() {
        let cfg = single_stream_config();
        let mapper = Mapper::compile(&cfg).unwrap();
        let mut batch = mapper.new_batch(&HashSet::new(), false);
        for i in 0..PARSER_POOL_CAPACITY + 4 {
            let body = format!(r#"{{"id": {i}, "name": "a"}}"#);
            mapper
                .append_to_columns("S", body.as_bytes(), &mut batch)
                .unwrap();
        }
        assert_eq!(batch.size(), PARSER_POOL_CAPACITY + 4);
        assert!(mapper.parser_pool.free_len() >= 1);
    }

    #[test]
    fn scenario_4_nested_path() {
        let mut streams = HashMap::new();
        streams.insert(
            "S".to_string(),
            StreamSchema {
                fields: vec![FieldSpec {
                    field_name: "user.city".to_string(),
                    field_type: SourceFieldType::String,
                }],
                join_key_field: None,
                join_orientation: None,
                join_window: None,
            },
        );
        let cfg = MapperConfig {
            r#type: "jsonToClickhouse".to_string(),
            streams,
            sink_mapping: vec![SinkMappingEntry {
                column_name: "city".to_string(),
                stream_name: "S".to_string(),
                field_name: "user.city".to_string(),
                column_type: "String".to_string(),
            }],
        };
        let mapper = Mapper::compile(&cfg).unwrap();
        let mut batch = mapper.new_batch(&HashSet::new(), false);
        mapper
            .append_to_columns("S", br#"{"user": {"city": "NY"}}"#, &mut batch)
            .unwrap();
        match &batch.columns()[0] {
            Column::String(v) => assert_eq!(v, &vec!["NY".to_string()]),
            _ => panic!("expected String"),
        }
    }

    #[test]
    fn scenario_5_joined_multi_stream() {
        let mut streams = HashMap::new();
        streams.insert(
            "L".to_string(),
            StreamSchema {
                fields: vec![
                    FieldSpec {
                        field_name: "id".to_string(),
                        field_type: SourceFieldType::String,
                    },
                    FieldSpec {
                        field_name: "n".to_string(),
                        field_type: SourceFieldType::String,
                    },
                ],
                join_key_field: Some("id".to_string()),
                join_orientation: Some(JoinOrientation::Left),
                join_window: None,
            },
        );
        streams.insert(
            "R".to_string(),
            StreamSchema {
                fields: vec![
                    FieldSpec {
                        field_name: "id".to_string(),
                        field_type: SourceFieldType::String,
                    },
                    FieldSpec {
                        field_name: "v".to_string(),
                        field_type: SourceFieldType::Int,
                    },
                ],
                join_key_field: Some("id".to_string()),
                join_orientation: Some(JoinOrientation::Right),
                join_window: None,
            },
        );
        let cfg = MapperConfig {
            r#type: "jsonToClickhouse".to_string(),
            streams: streams.clone(),
            sink_mapping: vec![
                SinkMappingEntry {
                    column_name: "lid".to_string(),
                    stream_name: "L".to_string(),
                    field_name: "id".to_string(),
                    column_type: "String".to_string(),
                },
                SinkMappingEntry {
                    column_name: "ln".to_string(),
                    stream_name: "L".to_string(),
                    field_name: "n".to_string(),
                    column_type: "String".to_string(),
                },
                SinkMappingEntry {
                    column_name: "rv".to_string(),
                    stream_name: "R".to_string(),
                    field_name: "v".to_string(),
                    column_type: "Int32".to_string(),
                },
            ],
        };
        let mapper = Mapper::compile(&cfg).unwrap();
        assert!(mapper.is_multi_stream());
        assert_eq!(mapper.left_stream(), Some("L"));
        assert_eq!(mapper.right_stream(), Some("R"));

        let joined = join_data(
            "L",
            &streams["L"],
            br#"{"id": "1", "n": "a"}"#,
            "R",
            &streams["R"],
            br#"{"id": "1", "v": 7}"#,
        )
        .unwrap();

        let mut batch = mapper.new_batch(&HashSet::new(), false);
        mapper.append_to_columns("L", &joined, &mut batch).unwrap();
        assert_eq!(batch.size(), 1);
        match &batch.columns()[0] {
            Column::String(v) => assert_eq!(v, &vec!["1".to_string()]),
            _ => panic!("expected String"),
        }
        match &batch.columns()[1] {
            Column::String(v) => assert_eq!(v, &vec!["a".to_string()]),
            _ => panic!("expected String"),
        }
        match &batch.columns()[2] {
            Column::Int32(v) => assert_eq!(v, &vec![7]),
            _ => panic!("expected Int32"),
        }
    }

    #[test]
    fn nullable_column_type_rejected_at_compile() {
        let mut cfg = single_stream_config();
        cfg.sink_mapping[0].column_type = "Nullable(Int32)".to_string();
        let err = Mapper::compile(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::NullableRejected { .. }));
    }

    #[test]
    fn join_requires_exactly_two_streams() {
        let mut streams = HashMap::new();
        streams.insert(
            "L".to_string(),
            StreamSchema {
                fields: vec![],
                join_key_field: None,
                join_orientation: Some(JoinOrientation::Left),
                join_window: None,
            },
        );
        let cfg = MapperConfig {
            r#type: "jsonToClickhouse".to_string(),
            streams,
            sink_mapping: vec![SinkMappingEntry {
                column_name: "c".to_string(),
                stream_name: "L".to_string(),
                field_name: "x".to_string(),
                column_type: "String".to_string(),
            }],
        };
        let err = Mapper::compile(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::WrongJoinStreamCount(1)));
    }

    #[test]
    fn invalid_join_key_field_rejected() {
        let mut cfg = single_stream_config();
        cfg.streams.get_mut("S").unwrap().join_key_field = Some("nonexistent".to_string());
        let err = Mapper::compile(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidJoinKey { .. }));
    }

    #[test]
    fn duplicate_column_name_rejected() {
        let mut cfg = single_stream_config();
        let dup = cfg.sink_mapping[0].clone();
        cfg.sink_mapping.push(dup);
        let err = Mapper::compile(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateColumnName(_)));
    }

    #[test]
    fn ordered_columns_for_stream_matches_stream_column_indices() {
        let cfg = single_stream_config();
        let mapper = Mapper::compile(&cfg).unwrap();
        assert_eq!(mapper.ordered_columns_for_stream("S"), vec!["id", "name"]);
    }
}
