//! Closed enumerations for source-field types and sink column types.
//!
//! Parameterised column types (`Array`, `Map`, `LowCardinality`, `Nullable`,
//! `FixedString`, `DateTime64`) are parsed once, at mapper-compile time,
//! into this recursive variant so the runtime dispatcher is a total match.

use std::fmt;
use thiserror::Error;

/// The type tag carried alongside a raw JSON value for a declared stream
/// field (spec.md §3, "Source-field type").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFieldType {
    String,
    Bytes,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Float32,
    Float64,
    Array,
    Map,
}

impl fmt::Display for SourceFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error parsing a column-type string into a [`ColumnType`].
#[derive(Debug, Error)]
pub enum ColumnTypeParseError {
    #[error("unknown column type: {0}")]
    Unknown(String),
    #[error("malformed parameterised type: {0}")]
    Malformed(String),
}

/// A sink column's declared type. Base variants correspond 1:1 to
/// spec.md §3's base set; `Array`/`Map` are parameterised by boxed inner
/// types; `LowCardinality`/`Nullable` are decorators over any other
/// variant (validated separately: `Nullable` is rejected at mapper
/// compile time in columnar mode, see `mapper::compile`).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    String,
    FixedString(usize),
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Enum8,
    Enum16,
    DateTime,
    DateTime64(u8, Option<String>),
    Uuid,
    Array(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    LowCardinality(Box<ColumnType>),
    Nullable(Box<ColumnType>),
}

impl ColumnType {
    /// Parse the full type string as it appears in a sink-mapping entry,
    /// e.g. `"LowCardinality(String)"`, `"DateTime64(3, UTC)"`,
    /// `"Array(Map(String, String))"`.
    pub fn parse(raw: &str) -> Result<Self, ColumnTypeParseError> {
        let raw = raw.trim();
        if let Some(inner) = strip_wrapper(raw, "Nullable") {
            return Ok(ColumnType::Nullable(Box::new(ColumnType::parse(inner)?)));
        }
        if let Some(inner) = strip_wrapper(raw, "LowCardinality") {
            return Ok(ColumnType::LowCardinality(Box::new(ColumnType::parse(
                inner,
            )?)));
        }
        if let Some(inner) = strip_wrapper(raw, "Array") {
            return Ok(ColumnType::Array(Box::new(ColumnType::parse(inner)?)));
        }
        if let Some(inner) = strip_wrapper(raw, "Map") {
            let (k, v) = split_top_level_comma(inner)
                .ok_or_else(|| ColumnTypeParseError::Malformed(raw.to_string()))?;
            return Ok(ColumnType::Map(
                Box::new(ColumnType::parse(k.trim())?),
                Box::new(ColumnType::parse(v.trim())?),
            ));
        }
        if let Some(inner) = strip_wrapper(raw, "FixedString") {
            let n: usize = inner
                .trim()
                .parse()
                .map_err(|_| ColumnTypeParseError::Malformed(raw.to_string()))?;
            return Ok(ColumnType::FixedString(n));
        }
        if let Some(inner) = strip_wrapper(raw, "DateTime64") {
            let (p_str, tz) = match split_top_level_comma(inner) {
                Some((p, tz)) => (p.trim(), Some(tz.trim().trim_matches('\'').to_string())),
                None => (inner.trim(), None),
            };
            let p: u8 = p_str
                .parse()
                .map_err(|_| ColumnTypeParseError::Malformed(raw.to_string()))?;
            return Ok(ColumnType::DateTime64(p, tz));
        }
        match raw {
            "String" => Ok(ColumnType::String),
            "Bool" => Ok(ColumnType::Bool),
            "Int8" => Ok(ColumnType::Int8),
            "Int16" => Ok(ColumnType::Int16),
            "Int32" => Ok(ColumnType::Int32),
            "Int64" => Ok(ColumnType::Int64),
            "UInt8" => Ok(ColumnType::UInt8),
            "UInt16" => Ok(ColumnType::UInt16),
            "UInt32" => Ok(ColumnType::UInt32),
            "UInt64" => Ok(ColumnType::UInt64),
            "Float32" => Ok(ColumnType::Float32),
            "Float64" => Ok(ColumnType::Float64),
            "Enum8" => Ok(ColumnType::Enum8),
            "Enum16" => Ok(ColumnType::Enum16),
            "DateTime" => Ok(ColumnType::DateTime),
            "UUID" => Ok(ColumnType::Uuid),
            other => Err(ColumnTypeParseError::Unknown(other.to_string())),
        }
    }

    /// True for the base/decorator shapes that accept the given source
    /// field type directly as a scalar int-family member (used by
    /// `coerce`).
    pub fn is_nullable(&self) -> bool {
        matches!(self, ColumnType::Nullable(_))
    }
}

fn strip_wrapper<'a>(raw: &'a str, wrapper: &str) -> Option<&'a str> {
    let prefix = format!("{wrapper}(");
    if raw.starts_with(&prefix) && raw.ends_with(')') {
        Some(&raw[prefix.len()..raw.len() - 1])
    } else {
        None
    }
}

/// Split on the first top-level comma (not nested inside parens). Needed
/// for `Map(K, V)` and `DateTime64(p, tz)` where `K`/`V` may themselves be
/// parameterised types containing commas.
fn split_top_level_comma(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base_types() {
        assert_eq!(ColumnType::parse("String").unwrap(), ColumnType::String);
        assert_eq!(ColumnType::parse("UUID").unwrap(), ColumnType::Uuid);
    }

    #[test]
    fn parses_fixed_string() {
        assert_eq!(
            ColumnType::parse("FixedString(16)").unwrap(),
            ColumnType::FixedString(16)
        );
    }

    #[test]
    fn parses_nested_low_cardinality_nullable() {
        let t = ColumnType::parse("LowCardinality(String)").unwrap();
        assert_eq!(t, ColumnType::LowCardinality(Box::new(ColumnType::String)));
    }

    #[test]
    fn parses_datetime64_with_timezone() {
        let t = ColumnType::parse("DateTime64(3, UTC)").unwrap();
        assert_eq!(t, ColumnType::DateTime64(3, Some("UTC".to_string())));
    }

    #[test]
    fn parses_datetime64_without_timezone() {
        let t = ColumnType::parse("DateTime64(9)").unwrap();
        assert_eq!(t, ColumnType::DateTime64(9, None));
    }

    #[test]
    fn parses_array_of_map() {
        let t = ColumnType::parse("Array(Map(String, String))").unwrap();
        assert_eq!(
            t,
            ColumnType::Array(Box::new(ColumnType::Map(
                Box::new(ColumnType::String),
                Box::new(ColumnType::String)
            )))
        );
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(ColumnType::parse("Frobnicate").is_err());
    }
}
