use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::workflow::RetryState;

/// A single predicate entry (spec §3 "Event trigger" predicate operators).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub path: String,
    pub operator: PredicateOp,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PredicateOp {
    Exists,
    Equals { value: Value },
    NotEquals { value: Value },
    Contains { value: Value },
    In { values: Vec<Value> },
    NotIn { values: Vec<Value> },
    Gt { value: f64 },
    Gte { value: f64 },
    Lt { value: f64 },
    Lte { value: f64 },
    Regex { pattern: String, flags: String },
}

impl Predicate {
    /// Validates the predicate can ever match, per spec §4.D step 2
    /// "invalid regexes are rejected at trigger creation time".
    pub fn validate(&self) -> Result<()> {
        if let PredicateOp::Regex { pattern, .. } = &self.operator {
            regex::Regex::new(pattern)
                .map_err(|e| CoreError::validation(format!("invalid regex '{pattern}': {e}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Disabled,
}

/// `spec.md` §3 "Event trigger".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTrigger {
    pub id: String,
    pub workflow_definition_id: String,
    pub name: Option<String>,
    pub event_type: String,
    pub event_source: Option<String>,
    pub predicates: Vec<Predicate>,
    pub parameter_template: Value,
    pub run_key_template: Option<String>,
    pub idempotency_key_expression: Option<String>,
    pub throttle_window_ms: Option<u64>,
    pub throttle_count: Option<u32>,
    pub max_concurrency: Option<u32>,
    pub metadata: Value,
    pub status: TriggerStatus,
    pub version: u32,
}

impl EventTrigger {
    pub fn validate(&self) -> Result<()> {
        for predicate in &self.predicates {
            predicate.validate()?;
        }
        Ok(())
    }
}

/// Closed set per spec §9 Open Question #2: a delivery's retry kind is
/// either re-evaluating the *trigger* match or re-advancing the *workflow*
/// run it already launched. Unknown values are rejected at the boundary
/// rather than silently accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    Trigger,
    Workflow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Matched,
    Throttled,
    Launched,
    Skipped,
    Failed,
}

/// One per (trigger, event) match candidate (spec §3 "Trigger delivery").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDelivery {
    pub id: String,
    pub trigger_id: String,
    pub workflow_definition_id: String,
    pub event_id: String,
    pub status: DeliveryStatus,
    pub retry_kind: Option<RetryKind>,
    pub retry_state: RetryState,
    pub retry_attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub workflow_run_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_regex_fails_validation() {
        let predicate = Predicate {
            path: "$.payload.x".into(),
            operator: PredicateOp::Regex {
                pattern: "(unclosed".into(),
                flags: String::new(),
            },
            case_sensitive: true,
        };
        assert!(predicate.validate().is_err());
    }

    #[test]
    fn valid_regex_passes_validation() {
        let predicate = Predicate {
            path: "$.payload.x".into(),
            operator: PredicateOp::Regex {
                pattern: "^abc.*$".into(),
                flags: String::new(),
            },
            case_sensitive: true,
        };
        assert!(predicate.validate().is_ok());
    }

    #[test]
    fn retry_kind_serializes_as_closed_set() {
        let json = serde_json::to_string(&RetryKind::Trigger).unwrap();
        assert_eq!(json, "\"trigger\"");
        let err: std::result::Result<RetryKind, _> = serde_json::from_str("\"unknown-kind\"");
        assert!(err.is_err());
    }
}
