use apphub_core::jsonpath;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unresolved reference '{0}' in parameter template")]
    UnresolvedReference(String),
}

/// Walks `template`, replacing each string leaf that is *entirely* a
/// `{{ event.payload.<path> }}` or `{{ trigger.metadata.<path> }}`
/// reference with the resolved JSON value (spec §4.D "Parameter
/// rendering", §9 "Dynamic parameter templates": evaluated once, at
/// trigger-match time, never re-evaluated downstream).
///
/// A reference embedded inside a longer string (e.g. `"ns-{{ event... }}"`)
/// is substituted as its string form; a leaf that is *only* a reference
/// keeps the resolved value's own JSON type (so a numeric payload field
/// renders as a JSON number, not a quoted string).
pub fn render(
    template: &Value,
    event_payload: &Value,
    trigger_metadata: &Value,
) -> Result<Value, TemplateError> {
    match template {
        Value::String(s) => render_string(s, event_payload, trigger_metadata),
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| render(item, event_payload, trigger_metadata))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::new();
            for (key, value) in map {
                rendered.insert(key.clone(), render(value, event_payload, trigger_metadata)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn render_string(
    s: &str,
    event_payload: &Value,
    trigger_metadata: &Value,
) -> Result<Value, TemplateError> {
    let trimmed = s.trim();
    if let Some(whole_match) = as_whole_reference(trimmed) {
        return resolve_reference(whole_match, event_payload, trigger_metadata)
            .map(|v| v.clone())
            .ok_or_else(|| TemplateError::UnresolvedReference(whole_match.to_string()));
    }

    let mut result = String::new();
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            result.push_str(rest);
            rest = "";
            break;
        };
        result.push_str(&rest[..start]);
        let reference = rest[start + 2..start + end].trim();
        let resolved = resolve_reference(reference, event_payload, trigger_metadata)
            .ok_or_else(|| TemplateError::UnresolvedReference(reference.to_string()))?;
        result.push_str(&value_to_string(resolved));
        rest = &rest[start + end + 2..];
    }
    result.push_str(rest);
    Ok(Value::String(result))
}

fn as_whole_reference(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    Some(inner.trim())
}

fn resolve_reference<'a>(
    reference: &str,
    event_payload: &'a Value,
    trigger_metadata: &'a Value,
) -> Option<&'a Value> {
    if let Some(path) = reference.strip_prefix("event.payload") {
        let query = format!("${path}");
        return jsonpath::resolve(event_payload, &query);
    }
    if let Some(path) = reference.strip_prefix("trigger.metadata") {
        let query = format!("${path}");
        return jsonpath::resolve(trigger_metadata, &query);
    }
    None
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_reference_keeps_json_type() {
        let payload = json!({"status": "active"});
        let template = json!("{{ event.payload.status }}");
        let rendered = render(&template, &payload, &Value::Null).unwrap();
        assert_eq!(rendered, json!("active"));
    }

    #[test]
    fn embedded_reference_renders_as_string() {
        let payload = json!({"namespace": "feature-flags"});
        let template = json!("ns-{{ event.payload.namespace }}-run");
        let rendered = render(&template, &payload, &Value::Null).unwrap();
        assert_eq!(rendered, json!("ns-feature-flags-run"));
    }

    #[test]
    fn unresolved_required_reference_errors() {
        let template = json!("{{ event.payload.missing }}");
        let err = render(&template, &json!({}), &Value::Null).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedReference(_)));
    }

    #[test]
    fn nested_object_is_rendered_recursively() {
        let payload = json!({"namespace": "feature-flags", "count": 3});
        let template = json!({
            "namespace": "{{ event.payload.namespace }}",
            "count": "{{ event.payload.count }}",
        });
        let rendered = render(&template, &payload, &Value::Null).unwrap();
        assert_eq!(rendered["namespace"], json!("feature-flags"));
        assert_eq!(rendered["count"], json!(3));
    }
}
