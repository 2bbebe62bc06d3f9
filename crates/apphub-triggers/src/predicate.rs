use apphub_core::jsonpath;
use apphub_core::trigger::{Predicate, PredicateOp};
use serde_json::Value;

/// Evaluates one predicate against an envelope's payload (spec §4.D
/// "Matching algorithm" step 2). Predicates within a trigger are
/// conjunctive; the caller ANDs these results.
pub fn evaluate(predicate: &Predicate, payload: &Value) -> bool {
    let resolved = jsonpath::resolve(payload, &predicate.path);
    match &predicate.operator {
        PredicateOp::Exists => resolved.map(|v| !v.is_null()).unwrap_or(false),
        PredicateOp::Equals { value } => compare_equal(resolved, value, predicate.case_sensitive),
        PredicateOp::NotEquals { value } => !compare_equal(resolved, value, predicate.case_sensitive),
        PredicateOp::Contains { value } => compare_contains(resolved, value, predicate.case_sensitive),
        PredicateOp::In { values } => values
            .iter()
            .any(|v| compare_equal(resolved, v, predicate.case_sensitive)),
        PredicateOp::NotIn { values } => !values
            .iter()
            .any(|v| compare_equal(resolved, v, predicate.case_sensitive)),
        PredicateOp::Gt { value } => numeric(resolved).map(|n| n > *value).unwrap_or(false),
        PredicateOp::Gte { value } => numeric(resolved).map(|n| n >= *value).unwrap_or(false),
        PredicateOp::Lt { value } => numeric(resolved).map(|n| n < *value).unwrap_or(false),
        PredicateOp::Lte { value } => numeric(resolved).map(|n| n <= *value).unwrap_or(false),
        PredicateOp::Regex { pattern, flags } => match_regex(resolved, pattern, flags),
    }
}

fn compare_equal(resolved: Option<&Value>, expected: &Value, case_sensitive: bool) -> bool {
    match (resolved, expected) {
        (Some(Value::String(a)), Value::String(b)) if !case_sensitive => {
            a.to_lowercase() == b.to_lowercase()
        }
        (Some(a), b) => a == b,
        (None, _) => false,
    }
}

fn compare_contains(resolved: Option<&Value>, needle: &Value, case_sensitive: bool) -> bool {
    match resolved {
        Some(Value::String(haystack)) => match needle {
            Value::String(needle) => {
                if case_sensitive {
                    haystack.contains(needle.as_str())
                } else {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
            }
            _ => false,
        },
        Some(Value::Array(items)) => items.iter().any(|item| item == needle),
        _ => false,
    }
}

/// Non-finite values fail closed: no match (spec §4.D "gt/gte/lt/lte").
fn numeric(resolved: Option<&Value>) -> Option<f64> {
    let n = resolved?.as_f64()?;
    n.is_finite().then_some(n)
}

fn match_regex(resolved: Option<&Value>, pattern: &str, flags: &str) -> bool {
    let Some(Value::String(text)) = resolved else {
        return false;
    };
    let effective_pattern = if flags.contains('i') {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    regex::Regex::new(&effective_pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn predicate(path: &str, op: PredicateOp) -> Predicate {
        Predicate {
            path: path.to_string(),
            operator: op,
            case_sensitive: true,
        }
    }

    #[test]
    fn exists_requires_non_null() {
        let payload = json!({"namespace": "feature-flags"});
        assert!(evaluate(&predicate("$.namespace", PredicateOp::Exists), &payload));
        assert!(!evaluate(&predicate("$.missing", PredicateOp::Exists), &payload));
    }

    #[test]
    fn equals_respects_case_sensitivity() {
        let payload = json!({"status": "Active"});
        let mut p = predicate(
            "$.status",
            PredicateOp::Equals {
                value: json!("active"),
            },
        );
        assert!(!evaluate(&p, &payload));
        p.case_sensitive = false;
        assert!(evaluate(&p, &payload));
    }

    #[test]
    fn gt_fails_closed_on_non_numeric() {
        let payload = json!({"score": "not-a-number"});
        assert!(!evaluate(&predicate("$.score", PredicateOp::Gt { value: 1.0 }), &payload));
    }

    #[test]
    fn in_membership() {
        let payload = json!({"tier": "gold"});
        let p = predicate(
            "$.tier",
            PredicateOp::In {
                values: vec![json!("silver"), json!("gold")],
            },
        );
        assert!(evaluate(&p, &payload));
    }

    #[test]
    fn regex_matches_with_case_insensitive_flag() {
        let payload = json!({"name": "Feature-Flags"});
        let p = predicate(
            "$.name",
            PredicateOp::Regex {
                pattern: "^feature-".to_string(),
                flags: "i".to_string(),
            },
        );
        assert!(evaluate(&p, &payload));
    }
}
