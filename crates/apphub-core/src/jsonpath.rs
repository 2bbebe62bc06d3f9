//! A small dotted-path subset evaluator, shared by the event bus's
//! `list(jsonPath)` filter and the trigger processor's predicate engine.
//!
//! Supports `$.payload.a.b` style dotted access and a trailing `[n]` array
//! index per segment. No example in the retrieval pack pulls in a full
//! JSONPath crate, so this stays intentionally minimal rather than
//! fabricating a dependency.

use serde_json::Value;

/// Resolves `path` (e.g. `"$.payload.namespace"` or `"$.items[0].id"`)
/// against `root`. Returns `None` if any segment is missing or type-mismatched.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.strip_prefix("$.").or_else(|| path.strip_prefix('$'))?;
    if trimmed.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for raw_segment in trimmed.split('.') {
        if raw_segment.is_empty() {
            return None;
        }
        let (name, indices) = parse_segment(raw_segment)?;
        if !name.is_empty() {
            current = current.get(name)?;
        }
        for index in indices {
            current = current.get(index)?;
        }
    }
    Some(current)
}

/// Splits a segment like `items[0][1]` into its field name (possibly
/// empty, for a bare `[n]` segment) and its ordered list of array indices.
fn parse_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
    match segment.find('[') {
        None => Some((segment, Vec::new())),
        Some(first_bracket) => {
            let name = &segment[..first_bracket];
            let mut indices = Vec::new();
            let mut rest = &segment[first_bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let end = stripped.find(']')?;
                let index: usize = stripped[..end].parse().ok()?;
                indices.push(index);
                rest = &stripped[end + 1..];
            }
            if !rest.is_empty() {
                return None;
            }
            Some((name, indices))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_field() {
        let root = json!({"payload": {"namespace": "feature-flags"}});
        assert_eq!(
            resolve(&root, "$.payload.namespace"),
            Some(&json!("feature-flags"))
        );
    }

    #[test]
    fn resolves_array_index() {
        let root = json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(resolve(&root, "$.items[1].id"), Some(&json!(2)));
    }

    #[test]
    fn missing_path_is_none() {
        let root = json!({"payload": {}});
        assert_eq!(resolve(&root, "$.payload.missing"), None);
    }

    #[test]
    fn root_path_returns_whole_value() {
        let root = json!({"a": 1});
        assert_eq!(resolve(&root, "$"), Some(&root));
    }

    #[test]
    fn out_of_bounds_index_is_none() {
        let root = json!({"items": [1, 2]});
        assert_eq!(resolve(&root, "$.items[5]"), None);
    }
}
