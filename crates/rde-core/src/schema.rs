//! Stream schemas, sink mappings, and the `MapperConfig` wire shape
//! consumed from the pipeline config store (spec.md §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::SourceFieldType;

/// Which side of a join a stream plays, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOrientation {
    Left,
    Right,
}

/// One declared field of a stream schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_name: String,
    pub field_type: SourceFieldType,
}

/// For one logical input stream: its ordered fields plus optional join
/// role (spec.md §3, "Stream schema").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamSchema {
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub join_key_field: Option<String>,
    #[serde(default)]
    pub join_orientation: Option<JoinOrientation>,
    #[serde(default, with = "humantime_duration_opt")]
    pub join_window: Option<Duration>,
}

impl StreamSchema {
    pub fn field_type(&self, name: &str) -> Option<SourceFieldType> {
        self.fields
            .iter()
            .find(|f| f.field_name == name)
            .map(|f| f.field_type)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.field_name == name)
    }
}

/// One ordered sink-mapping entry: `(column_name, stream_name, field_name,
/// column_type)` (spec.md §3, "Sink mapping"). `column_type` is kept as the
/// raw configured string on the wire; the compiled `Mapper` parses it once
/// into a `ColumnType` and caches the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkMappingEntry {
    pub column_name: String,
    pub stream_name: String,
    pub field_name: String,
    pub column_type: String,
}

/// The `jsonToClickhouse`-shaped mapper configuration loaded from the
/// pipeline config store (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(rename = "type", default = "default_mapper_type")]
    pub r#type: String,
    pub streams: HashMap<String, StreamSchema>,
    pub sink_mapping: Vec<SinkMappingEntry>,
}

fn default_mapper_type() -> String {
    "jsonToClickhouse".to_string()
}

mod humantime_duration_opt {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match v {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_mapper_config_wire_shape() {
        let json = r#"
        {
          "type": "jsonToClickhouse",
          "streams": {
            "S": { "fields": [{"field_name": "id", "field_type": "int"}, {"field_name": "ok", "field_type": "bool"}] }
          },
          "sink_mapping": [
            {"column_name": "c1", "stream_name": "S", "field_name": "id", "column_type": "Int32"},
            {"column_name": "c2", "stream_name": "S", "field_name": "ok", "column_type": "Bool"}
          ]
        }
        "#;
        let cfg: MapperConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.streams.len(), 1);
        assert_eq!(cfg.sink_mapping.len(), 2);
        assert!(cfg.streams["S"].has_field("id"));
    }
}
