use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// A workflow definition (spec §3 "Workflow definition"), identified by a
/// unique URL-safe slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub slug: String,
    pub version: u32,
    pub steps: Vec<WorkflowStepDefinition>,
    pub triggers: Vec<String>,
    pub parameters_schema: Value,
    pub default_parameters: Value,
    pub output_schema: Option<Value>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepDefinition {
    pub step_id: String,
    pub display_name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    pub depends_on: Vec<String>,
    pub retry_policy: Option<RetryPolicySpec>,
    pub partitioning: Option<PartitioningSpec>,
    pub produces: Vec<AssetRef>,
    pub consumes: Vec<AssetRef>,
    #[serde(default)]
    pub continue_on_skip: bool,
}

/// Steps are a tagged variant, not an inheritance hierarchy (spec §9
/// "Polymorphic steps"). Dispatch downstream is a `match` on this tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Job {
        job_slug: String,
        parameters: Value,
    },
    Service {
        service_slug: String,
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body_template: Option<Value>,
        timeout_ms: u64,
    },
    Fanout {
        body_step_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRef {
    pub asset_id: String,
}

/// `{maxAttempts, strategy, initialDelayMs, maxDelayMs, jitterRatio}` (spec
/// §4.E "Retry policy").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicySpec {
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
    /// Error/failure-reason identifiers that short-circuit retry entirely
    /// (spec §4.E "non-2xx is retriable unless the policy marks it fatal").
    /// Job steps compare this against the handler's `errorMessage` type tag;
    /// service steps compare it against `"http_{status}"` and
    /// `"service_unavailable"`.
    #[serde(default)]
    pub non_retryable_errors: Vec<String>,
}

impl Default for RetryPolicySpec {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::Fixed,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.0,
            non_retryable_errors: Vec::new(),
        }
    }
}

impl RetryPolicySpec {
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    pub fn should_retry(&self, failure_reason: Option<&str>) -> bool {
        match failure_reason {
            Some(reason) => !self.non_retryable_errors.iter().any(|r| r == reason),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed,
    Exponential,
    Jittered,
}

/// `{type: "timeWindow"|"dynamic"|"static", granularity?, lookback?, values?}`
/// (spec §4.E "Partitioning").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PartitioningSpec {
    TimeWindow {
        granularity: TimeWindowGranularity,
        lookback: u32,
    },
    Dynamic,
    Static {
        values: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindowGranularity {
    Hour,
    Day,
}

/// Enumerates partition keys for a spec at a point in time (spec §4.E,
/// boundary case in §8: `lookback=2` at an hourly granularity yields 3
/// inclusive keys, current bucket included).
pub fn enumerate_partition_keys(spec: &PartitioningSpec, now: DateTime<Utc>) -> Vec<String> {
    match spec {
        PartitioningSpec::Dynamic => Vec::new(),
        PartitioningSpec::Static { values } => values.clone(),
        PartitioningSpec::TimeWindow {
            granularity,
            lookback,
        } => {
            let mut keys = Vec::with_capacity(*lookback as usize + 1);
            for offset in (0..=*lookback).rev() {
                let bucket = match granularity {
                    TimeWindowGranularity::Hour => now - chrono::Duration::hours(offset as i64),
                    TimeWindowGranularity::Day => now - chrono::Duration::days(offset as i64),
                };
                keys.push(format_bucket(bucket, *granularity));
            }
            keys
        }
    }
}

fn format_bucket(instant: DateTime<Utc>, granularity: TimeWindowGranularity) -> String {
    match granularity {
        TimeWindowGranularity::Hour => instant.format("%Y-%m-%dT%H").to_string(),
        TimeWindowGranularity::Day => instant.format("%Y-%m-%d").to_string(),
    }
}

/// Validates that step ids are unique, every dependency references a
/// defined step, the dependency graph is acyclic, every fanout names an
/// existing body step, and every `produces.assetId` is unique per-step
/// (spec §3 "Workflow definition" invariants).
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<()> {
    let mut seen_ids = HashSet::new();
    for step in &definition.steps {
        if !seen_ids.insert(step.step_id.as_str()) {
            return Err(CoreError::validation(format!(
                "duplicate step id '{}'",
                step.step_id
            )));
        }
        let mut seen_assets = HashSet::new();
        for asset in &step.produces {
            if !seen_assets.insert(asset.asset_id.as_str()) {
                return Err(CoreError::validation(format!(
                    "duplicate produced asset id '{}' on step '{}'",
                    asset.asset_id, step.step_id
                )));
            }
        }
    }

    let known: HashSet<&str> = definition.steps.iter().map(|s| s.step_id.as_str()).collect();
    for step in &definition.steps {
        for dep in &step.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(CoreError::validation(format!(
                    "step '{}' depends on undefined step '{}'",
                    step.step_id, dep
                )));
            }
        }
        if let StepKind::Fanout { body_step_id } = &step.kind {
            if !known.contains(body_step_id.as_str()) {
                return Err(CoreError::validation(format!(
                    "fanout step '{}' references undefined body step '{}'",
                    step.step_id, body_step_id
                )));
            }
        }
    }

    assert_acyclic(definition)
}

fn assert_acyclic(definition: &WorkflowDefinition) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    let steps: HashMap<&str, &WorkflowStepDefinition> = definition
        .steps
        .iter()
        .map(|s| (s.step_id.as_str(), s))
        .collect();
    let mut marks: HashMap<&str, Mark> = steps.keys().map(|k| (*k, Mark::Unvisited)).collect();

    fn visit<'a>(
        id: &'a str,
        steps: &HashMap<&'a str, &'a WorkflowStepDefinition>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(CoreError::validation(format!(
                    "cycle detected involving step '{id}'"
                )))
            }
            _ => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(step) = steps.get(id) {
            for dep in &step.depends_on {
                visit(dep, steps, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    for id in steps.keys().copied() {
        visit(id, &steps, &mut marks)?;
    }
    Ok(())
}

/// Workflow run status (spec §3 "Workflow run").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TriggeredBy {
    Manual,
    EventTrigger,
    Schedule,
    Module,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_definition_id: String,
    pub status: RunStatus,
    pub triggered_by: TriggeredBy,
    pub parameters: Value,
    pub partition_key: Option<String>,
    pub run_key: Option<String>,
    pub run_key_normalized: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub context: Value,
    pub module_id: Option<String>,
}

/// Lowercases a run key for the uniqueness column (spec §3: "runKey ...
/// normalized to lowercase").
pub fn normalize_run_key(run_key: &str) -> String {
    run_key.to_lowercase()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryState {
    Idle,
    Scheduled,
    Completed,
    Exhausted,
}

/// One per `(run_id, step_id)` (spec §3 "Workflow run step").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunStep {
    pub run_id: String,
    pub step_id: String,
    pub status: StepStatus,
    pub retry_state: RetryState,
    pub retry_attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error_message: Option<String>,
}

impl WorkflowRunStep {
    pub fn pending(run_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
            status: StepStatus::Pending,
            retry_state: RetryState::Idle,
            retry_attempts: 0,
            next_attempt_at: None,
            started_at: None,
            completed_at: None,
            output: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn step(id: &str, deps: &[&str]) -> WorkflowStepDefinition {
        WorkflowStepDefinition {
            step_id: id.to_string(),
            display_name: id.to_string(),
            kind: StepKind::Job {
                job_slug: "noop".into(),
                parameters: Value::Null,
            },
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            retry_policy: None,
            partitioning: None,
            produces: Vec::new(),
            consumes: Vec::new(),
            continue_on_skip: false,
        }
    }

    fn definition(steps: Vec<WorkflowStepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            slug: "demo".into(),
            version: 1,
            steps,
            triggers: Vec::new(),
            parameters_schema: Value::Null,
            default_parameters: Value::Null,
            output_schema: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn detects_cycle() {
        let def = definition(vec![step("a", &["b"]), step("b", &["a"])]);
        assert!(validate_definition(&def).is_err());
    }

    #[test]
    fn accepts_dag() {
        let def = definition(vec![step("a", &[]), step("b", &["a"]), step("c", &["a", "b"])]);
        assert!(validate_definition(&def).is_ok());
    }

    #[test]
    fn rejects_undefined_dependency() {
        let def = definition(vec![step("a", &["ghost"])]);
        assert!(validate_definition(&def).is_err());
    }

    #[test]
    fn time_window_partitioning_boundary_case() {
        // spec §8: now=2025-08-01T12:15:00Z, lookback=2, granularity=hour
        // yields exactly ["2025-08-01T10", "2025-08-01T11", "2025-08-01T12"].
        let now = Utc.with_ymd_and_hms(2025, 8, 1, 12, 15, 0).unwrap();
        let spec = PartitioningSpec::TimeWindow {
            granularity: TimeWindowGranularity::Hour,
            lookback: 2,
        };
        let keys = enumerate_partition_keys(&spec, now);
        assert_eq!(
            keys,
            vec![
                "2025-08-01T10".to_string(),
                "2025-08-01T11".to_string(),
                "2025-08-01T12".to_string(),
            ]
        );
    }

    #[test]
    fn dynamic_partitioning_is_always_empty() {
        let keys = enumerate_partition_keys(&PartitioningSpec::Dynamic, Utc::now());
        assert!(keys.is_empty());
    }

    #[test]
    fn run_key_normalization_lowercases() {
        assert_eq!(normalize_run_key("Nightly-Sync"), "nightly-sync");
    }
}
