//! JSON traversal (spec.md §4.2): locate a value at a dotted path (or a
//! flat key containing dots) inside a parsed JSON tree, returning a
//! borrowed (lazy) reference rather than a copy. Path parts are
//! pre-split at mapper-compile time via [`PathPart::split`] to amortise
//! the cost of the per-row walk, mirroring the teacher's
//! `extract_fields_from_json` recursive walker in `rde-tx`.

use serde_json::Value;
use thiserror::Error;

/// One segment of a dotted path, with an optional `name[k]` array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPart {
    pub key: String,
    pub index: Option<i64>,
}

impl PathPart {
    /// Pre-split a dotted field name (e.g. `"user.address.city"` or
    /// `"items[0].sku"`) into its parts, parsing any `name[k]` array
    /// index syntax per segment.
    pub fn split(path: &str) -> Vec<PathPart> {
        path.split('.').map(Self::parse_segment).collect()
    }

    fn parse_segment(segment: &str) -> PathPart {
        if let Some(open) = segment.find('[') {
            if segment.ends_with(']') {
                let key = segment[..open].to_string();
                let idx_str = &segment[open + 1..segment.len() - 1];
                let index = idx_str.parse::<i64>().ok();
                return PathPart { key, index };
            }
        }
        PathPart {
            key: segment.to_string(),
            index: None,
        }
    }
}

/// Traversal failures. A missing value is not an error (returns `Ok(None)`
/// so the mapper can append a type-appropriate zero); an out-of-bounds
/// array index always is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraversalError {
    #[error("array index {index} out of bounds at path segment {segment}")]
    OutOfBounds { segment: String, index: i64 },
}

/// Look up `path` in `root`: first as a single flat top-level key (to
/// honour join-prefixed keys like `left.id` emitted by the join payload
/// writer), falling back to a dotted walk through nested objects using
/// the pre-split `parts`. A key present both as a flat top-level key and
/// as a nested path: the flat key wins.
pub fn get_nested_value<'a>(
    root: &'a Value,
    flat_path: &str,
    parts: &[PathPart],
) -> Result<Option<&'a Value>, TraversalError> {
    if let Some(obj) = root.as_object() {
        if let Some(v) = obj.get(flat_path) {
            return Ok(Some(v));
        }
    }
    walk(root, parts)
}

fn walk<'a>(root: &'a Value, parts: &[PathPart]) -> Result<Option<&'a Value>, TraversalError> {
    let mut current = root;
    for part in parts {
        let next = match current.as_object().and_then(|o| o.get(&part.key)) {
            Some(v) => v,
            None => return Ok(None),
        };
        current = match part.index {
            None => next,
            Some(idx) => {
                if idx < 0 {
                    return Err(TraversalError::OutOfBounds {
                        segment: part.key.clone(),
                        index: idx,
                    });
                }
                match next.as_array().and_then(|a| a.get(idx as usize)) {
                    Some(v) => v,
                    None => {
                        return Err(TraversalError::OutOfBounds {
                            segment: part.key.clone(),
                            index: idx,
                        })
                    }
                }
            }
        };
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_key_wins_over_nested() {
        let v = json!({"left.id": "1", "left": {"id": "nested"}});
        let parts = PathPart::split("left.id");
        let got = get_nested_value(&v, "left.id", &parts).unwrap().unwrap();
        assert_eq!(got, &json!("1"));
    }

    #[test]
    fn nested_path_traversal() {
        let v = json!({"user": {"address": {"city": "NY"}}});
        let parts = PathPart::split("user.address.city");
        let got = get_nested_value(&v, "user.address.city", &parts)
            .unwrap()
            .unwrap();
        assert_eq!(got, &json!("NY"));
    }

    #[test]
    fn missing_field_is_none_not_error() {
        let v = json!({"id": 42});
        let parts = PathPart::split("name");
        assert_eq!(get_nested_value(&v, "name", &parts).unwrap(), None);
    }

    #[test]
    fn array_index_in_bounds() {
        let v = json!({"items": [{"sku": "a"}]});
        let parts = PathPart::split("items[0].sku");
        let got = get_nested_value(&v, "items[0].sku", &parts)
            .unwrap()
            .unwrap();
        assert_eq!(got, &json!("a"));
    }

    #[test]
    fn array_index_out_of_bounds_errors() {
        let v = json!({"items": []});
        let parts = PathPart::split("items[0].sku");
        assert!(matches!(
            get_nested_value(&v, "items[0].sku", &parts),
            Err(TraversalError::OutOfBounds { index: 0, .. })
        ));
    }

    #[test]
    fn negative_array_index_errors() {
        let v = json!({"items": [1, 2]});
        let parts = PathPart::split("items[-1]");
        assert!(matches!(
            get_nested_value(&v, "items[-1]", &parts),
            Err(TraversalError::OutOfBounds { index: -1, .. })
        ));
    }
}
