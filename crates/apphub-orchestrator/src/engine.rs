use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use apphub_core::error::CoreError;
use apphub_core::repository::{LaunchWorkflowRequest, WorkflowLauncher, WorkflowRepository};
use apphub_core::workflow::{
    enumerate_partition_keys, normalize_run_key, RetryState, RunStatus, StepKind, StepStatus,
    TriggeredBy, WorkflowDefinition, WorkflowRun, WorkflowRunStep, WorkflowStepDefinition,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::jobs::{JobOutcome, JobRegistry};
use crate::retry;
use crate::service_client::{call_service, ServiceCallOutcome, ServiceResolver};

pub const WORKFLOW_QUEUE: &str = "workflow";
pub const WORKFLOW_RETRY_QUEUE: &str = "workflow-retry";

/// Result of one `run_workflow_orchestration` pass (spec §4.E lifecycle).
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    pub run_id: String,
    pub status: RunStatus,
    pub advanced_steps: Vec<String>,
}

/// The workflow orchestrator: the heart of the system (spec §4.E).
/// `WorkflowDefinition` is interpreted as data — a step DAG — rather than
/// dispatched to a per-type compiled trait impl, generalizing the teacher's
/// `WorkflowExecutor<S>` (which replays a user-implemented `Workflow` trait)
/// into a generic interpreter. Step advancement is single-writer per run,
/// enforced with a per-run `tokio::sync::Mutex` keyed in a `DashMap`,
/// mirroring the teacher's per-workflow optimistic-concurrency boundary
/// without requiring an event-sourced replay log.
pub struct Orchestrator {
    repository: Arc<dyn WorkflowRepository>,
    jobs: Arc<JobRegistry>,
    service_resolver: Arc<dyn ServiceResolver>,
    http_client: reqwest::Client,
    queue: Arc<apphub_queue::QueueManager>,
    config: OrchestratorConfig,
    run_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        jobs: Arc<JobRegistry>,
        service_resolver: Arc<dyn ServiceResolver>,
        queue: Arc<apphub_queue::QueueManager>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            jobs,
            service_resolver,
            http_client: reqwest::Client::new(),
            queue,
            config,
            run_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, run_id: &str) -> Arc<AsyncMutex<()>> {
        self.run_locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// `runWorkflowOrchestration(runId)` (spec §4.E). The single entrypoint;
    /// everything else in this module exists to serve this call.
    #[instrument(skip(self))]
    pub async fn run_workflow_orchestration(
        &self,
        run_id: &str,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;

        let mut run = self
            .repository
            .get_run(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))?;

        if run.status.is_terminal() {
            return Ok(OrchestrationResult {
                run_id: run.id.clone(),
                status: run.status,
                advanced_steps: Vec::new(),
            });
        }

        let definition = self
            .repository
            .get_definition(&run.workflow_definition_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::DefinitionNotFound(run.workflow_definition_id.clone())
            })?;

        self.materialize_steps(&run, &definition).await?;

        let steps = self.repository.list_steps(&run.id).await?;
        let by_id: HashMap<&str, &WorkflowRunStep> =
            steps.iter().map(|s| (s.step_id.as_str(), s)).collect();

        let frontier = compute_frontier(&definition, &by_id);
        let mut advanced = Vec::new();
        for step_def in &frontier {
            self.advance_step(&run, &definition, step_def).await?;
            advanced.push(step_def.step_id.clone());
        }

        let final_steps = self.repository.list_steps(&run.id).await?;
        let new_status = recompute_run_status(&definition, &final_steps);
        if new_status != run.status {
            info!(run_id = %run.id, ?new_status, "workflow run transitioned");
            run.status = new_status;
            if new_status.is_terminal() {
                run.completed_at = Some(Utc::now());
            } else if run.started_at.is_none() {
                run.started_at = Some(Utc::now());
            }
            self.repository.put_run(run.clone()).await?;
        }

        Ok(OrchestrationResult {
            run_id: run.id,
            status: new_status,
            advanced_steps: advanced,
        })
    }

    /// Idempotently creates a `pending` `WorkflowRunStep` for every step in
    /// the definition (spec §4.E lifecycle step 2), except fanout bodies — a
    /// body step only ever executes inside the child runs a fanout step
    /// creates for it, never as a step of the parent run itself.
    async fn materialize_steps(
        &self,
        run: &WorkflowRun,
        definition: &WorkflowDefinition,
    ) -> Result<(), OrchestratorError> {
        for step_def in &definition.steps {
            if is_fanout_body(definition, &step_def.step_id) {
                continue;
            }
            if self
                .repository
                .get_step(&run.id, &step_def.step_id)
                .await?
                .is_none()
            {
                self.repository
                    .put_step(WorkflowRunStep::pending(run.id.clone(), step_def.step_id.clone()))
                    .await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self, run, definition))]
    async fn advance_step(
        &self,
        run: &WorkflowRun,
        definition: &WorkflowDefinition,
        step_def: &WorkflowStepDefinition,
    ) -> Result<(), OrchestratorError> {
        let mut step = self
            .repository
            .get_step(&run.id, &step_def.step_id)
            .await?
            .expect("materialized above");

        let outcome = match &step_def.kind {
            StepKind::Job { job_slug, parameters } => {
                self.advance_job_step(run, &step, job_slug, parameters).await
            }
            StepKind::Service {
                service_slug,
                method,
                path,
                headers,
                body_template,
                timeout_ms,
            } => {
                self.advance_service_step(
                    &step,
                    service_slug,
                    method,
                    path,
                    headers,
                    body_template.as_ref(),
                    *timeout_ms,
                )
                .await
            }
            StepKind::Fanout { body_step_id } => {
                self.advance_fanout_step(run, definition, &step, body_step_id).await
            }
        };

        match outcome {
            StepAdvanceOutcome::Skip => return Ok(()),
            StepAdvanceOutcome::Succeeded { output } => {
                step.status = StepStatus::Succeeded;
                step.retry_state = RetryState::Completed;
                step.next_attempt_at = None;
                step.completed_at = Some(Utc::now());
                step.output = Some(output);
                step.error_message = None;
            }
            StepAdvanceOutcome::Pending => {
                step.status = StepStatus::Running;
                step.next_attempt_at = None;
                if step.started_at.is_none() {
                    step.started_at = Some(Utc::now());
                }
            }
            StepAdvanceOutcome::Failed {
                error_message,
                error_type,
            } => {
                self.apply_retry_or_fail(&mut step, step_def, &error_message, error_type.as_deref());
            }
        }

        self.repository.put_step(step).await?;
        Ok(())
    }

    fn apply_retry_or_fail(
        &self,
        step: &mut WorkflowRunStep,
        step_def: &WorkflowStepDefinition,
        error_message: &str,
        error_type: Option<&str>,
    ) {
        let policy = step_def
            .retry_policy
            .clone()
            .unwrap_or_else(|| self.config.default_retry_policy.clone());

        let next_attempt = step.retry_attempts + 1;
        let retryable = policy.should_retry(error_type)
            && policy.has_attempts_remaining(next_attempt);

        if retryable {
            let delay = retry::compute_delay(next_attempt, &policy);
            step.status = StepStatus::Pending;
            step.retry_state = RetryState::Scheduled;
            step.retry_attempts = next_attempt;
            step.next_attempt_at = Some(Utc::now() + chrono_duration(delay));
            step.error_message = Some(error_message.to_string());
            warn!(step_id = %step.step_id, attempt = next_attempt, ?delay, "step failed, scheduled retry");
        } else {
            step.status = StepStatus::Failed;
            step.retry_state = RetryState::Exhausted;
            step.retry_attempts = next_attempt;
            step.next_attempt_at = None;
            step.error_message = Some(error_message.to_string());
            warn!(step_id = %step.step_id, "step failed, retries exhausted");
        }
    }

    async fn advance_job_step(
        &self,
        run: &WorkflowRun,
        step: &WorkflowRunStep,
        job_slug: &str,
        parameters: &serde_json::Value,
    ) -> StepAdvanceOutcome {
        let Some(handler) = self.jobs.get(job_slug) else {
            return StepAdvanceOutcome::Failed {
                error_message: format!("job '{job_slug}' is not registered"),
                error_type: Some("unknown_job".to_string()),
            };
        };

        if !self.should_dispatch(step) {
            return StepAdvanceOutcome::Skip;
        }

        match self.queue.try_queue(WORKFLOW_QUEUE) {
            Ok(Some(_handle)) => {
                let _ = self
                    .queue
                    .enqueue(
                        WORKFLOW_QUEUE,
                        format!("{}:{}", run.id, step.step_id),
                        serde_json::json!({"runId": run.id, "stepId": step.step_id}),
                        None,
                    )
                    .await;
                // Queue mode dispatches asynchronously; the worker calls back
                // into the orchestrator on completion (spec §4.A/§4.E). This
                // pass treats dispatch itself as the advancement and leaves
                // the step `running`.
                StepAdvanceOutcome::Pending
            }
            _ => match handler.handle(parameters.clone()).await {
                JobOutcome::Succeeded { result } => StepAdvanceOutcome::Succeeded { output: result },
                JobOutcome::Failed {
                    error_message,
                    error_type,
                } => StepAdvanceOutcome::Failed {
                    error_message,
                    error_type,
                },
                JobOutcome::Pending => StepAdvanceOutcome::Pending,
            },
        }
    }

    /// A step is only (re-)dispatched while `pending` and with no
    /// not-yet-due `nextAttemptAt`. A `running` step is already in flight
    /// (queue mode, awaiting a worker callback) and is left untouched until
    /// something external completes it.
    fn should_dispatch(&self, step: &WorkflowRunStep) -> bool {
        if step.status != StepStatus::Pending {
            return false;
        }
        match step.next_attempt_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    async fn advance_service_step(
        &self,
        step: &WorkflowRunStep,
        service_slug: &str,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body_template: Option<&serde_json::Value>,
        timeout_ms: u64,
    ) -> StepAdvanceOutcome {
        if !self.should_dispatch(step) {
            return StepAdvanceOutcome::Skip;
        }

        let base_url = self.service_resolver.resolve_base_url(service_slug).await;
        let timeout = if timeout_ms > 0 {
            Duration::from_millis(timeout_ms)
        } else {
            self.config.default_service_timeout
        };

        match call_service(
            &self.http_client,
            base_url.as_deref(),
            method,
            path,
            headers,
            body_template,
            timeout,
        )
        .await
        {
            ServiceCallOutcome::Succeeded { result } => StepAdvanceOutcome::Succeeded { output: result },
            ServiceCallOutcome::Failed {
                error_message,
                error_type,
            } => StepAdvanceOutcome::Failed {
                error_message,
                error_type: Some(error_type),
            },
        }
    }

    async fn advance_fanout_step(
        &self,
        run: &WorkflowRun,
        definition: &WorkflowDefinition,
        step: &WorkflowRunStep,
        body_step_id: &str,
    ) -> StepAdvanceOutcome {
        let Some(body_step_def) = definition.steps.iter().find(|s| &s.step_id == body_step_id) else {
            return StepAdvanceOutcome::Failed {
                error_message: format!("fanout body step '{body_step_id}' is undefined"),
                error_type: Some("invalid_definition".to_string()),
            };
        };

        let partition_keys = body_step_def
            .partitioning
            .as_ref()
            .map(|spec| enumerate_partition_keys(spec, Utc::now()))
            .unwrap_or_default();

        if !self.should_dispatch(step) {
            return StepAdvanceOutcome::Skip;
        }

        // Children run the body step alone, under a synthetic single-step
        // definition scoped to this fanout step — launching them against
        // the parent's own definition would re-trigger this same fanout
        // step inside every child and recurse without bound.
        let child_definition_slug = format!("{}::fanout::{}", definition.slug, body_step_id);
        if self
            .repository
            .get_definition(&child_definition_slug)
            .await
            .ok()
            .flatten()
            .is_none()
        {
            let mut child_body = body_step_def.clone();
            child_body.depends_on = Vec::new();
            let child_definition = WorkflowDefinition {
                slug: child_definition_slug.clone(),
                version: definition.version,
                steps: vec![child_body],
                triggers: Vec::new(),
                parameters_schema: serde_json::Value::Null,
                default_parameters: serde_json::Value::Null,
                output_schema: None,
                metadata: serde_json::json!({"fanoutParent": definition.slug}),
            };
            if let Err(err) = self.repository.put_definition(child_definition).await {
                return StepAdvanceOutcome::Failed {
                    error_message: err.to_string(),
                    error_type: Some("fanout_child_definition_failed".to_string()),
                };
            }
        }

        let mut child_ids = Vec::with_capacity(partition_keys.len());
        for key in &partition_keys {
            let request = LaunchWorkflowRequest {
                workflow_definition_slug: child_definition_slug.clone(),
                parameters: serde_json::json!({}),
                triggered_by: TriggeredBy::Module,
                partition_key: Some(key.clone()),
                run_key: Some(format!("{}-{}-{}", run.id, body_step_id, key)),
                module_id: run.module_id.clone(),
            };
            match self.launch_child(request).await {
                Ok(child) => child_ids.push(child.id),
                Err(err) => {
                    return StepAdvanceOutcome::Failed {
                        error_message: err.to_string(),
                        error_type: Some("fanout_child_launch_failed".to_string()),
                    }
                }
            }
        }

        StepAdvanceOutcome::Succeeded {
            output: serde_json::json!({"childRunIds": child_ids}),
        }
    }

    /// Fanout children are launched through the same `WorkflowLauncher` seam
    /// the trigger processor uses, rather than writing run rows directly —
    /// the orchestrator is its own launcher, so this simply delegates back
    /// into `launch`.
    async fn launch_child(&self, request: LaunchWorkflowRequest) -> Result<WorkflowRun, CoreError> {
        self.launch(request).await
    }
}

#[async_trait]
impl WorkflowLauncher for Orchestrator {
    /// Materializes a new `WorkflowRun` and runs the first orchestration
    /// pass synchronously (mirroring the teacher's `start_workflow`, which
    /// processes initial actions before returning). Rejects a run key that
    /// already has a non-terminal run for the same definition (spec §8
    /// invariant: "at most one run exists that is non-terminal").
    #[instrument(skip(self, request))]
    async fn launch(&self, request: LaunchWorkflowRequest) -> Result<WorkflowRun, CoreError> {
        let definition = self
            .repository
            .get_definition(&request.workflow_definition_slug)
            .await?
            .ok_or_else(|| {
                CoreError::not_found(format!(
                    "workflow definition: {}",
                    request.workflow_definition_slug
                ))
            })?;

        if let Some(run_key) = &request.run_key {
            let normalized = normalize_run_key(run_key);
            if let Some(existing) = self
                .repository
                .find_non_terminal_run_by_key(&definition.slug, &normalized)
                .await?
            {
                return Err(OrchestratorError::DuplicateRunKey(existing.run_key.unwrap_or(run_key.clone())).into());
            }
        }

        let run = WorkflowRun {
            id: Uuid::now_v7().to_string(),
            workflow_definition_id: definition.slug.clone(),
            status: RunStatus::Pending,
            triggered_by: request.triggered_by,
            parameters: request.parameters,
            partition_key: request.partition_key,
            run_key: request.run_key.clone(),
            run_key_normalized: request.run_key.as_deref().map(normalize_run_key),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            context: serde_json::json!({}),
            module_id: request.module_id,
        };
        self.repository.put_run(run.clone()).await?;
        info!(run_id = %run.id, definition = %definition.slug, "workflow run launched");

        let result = self
            .run_workflow_orchestration(&run.id)
            .await
            .map_err(CoreError::from)?;

        Ok(self
            .repository
            .get_run(&result.run_id)
            .await?
            .unwrap_or(run))
    }
}

enum StepAdvanceOutcome {
    Succeeded { output: serde_json::Value },
    /// Dispatched this pass but not yet complete (queue mode, or a handler
    /// that explicitly reported `JobOutcome::Pending`).
    Pending,
    /// Not eligible to run this pass (already in flight, or a scheduled
    /// retry not yet due) — leave the persisted step untouched.
    Skip,
    Failed {
        error_message: String,
        error_type: Option<String>,
    },
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

/// Steps with status `pending` whose dependencies are all `succeeded` (or
/// `skipped` with `continueOnSkip`) — spec §4.E lifecycle step 3.
fn compute_frontier<'a>(
    definition: &'a WorkflowDefinition,
    by_id: &HashMap<&str, &WorkflowRunStep>,
) -> Vec<&'a WorkflowStepDefinition> {
    definition
        .steps
        .iter()
        .filter(|step_def| {
            if is_fanout_body(definition, &step_def.step_id) {
                return false;
            }
            let Some(step) = by_id.get(step_def.step_id.as_str()) else {
                return false;
            };
            if step.status != StepStatus::Pending && step.status != StepStatus::Running {
                return false;
            }
            step_def.depends_on.iter().all(|dep_id| {
                by_id.get(dep_id.as_str()).is_some_and(|dep| {
                    dep.status == StepStatus::Succeeded
                        || (dep.status == StepStatus::Skipped
                            && dependency_allows_skip(definition, dep_id))
                })
            })
        })
        .collect()
}

fn dependency_allows_skip(definition: &WorkflowDefinition, step_id: &str) -> bool {
    definition
        .steps
        .iter()
        .find(|s| s.step_id == step_id)
        .map(|s| s.continue_on_skip)
        .unwrap_or(false)
}

/// True when `step_id` is the body of some `Fanout` step in `definition` —
/// such a step runs only inside the per-partition child runs its fanout
/// creates, and is excluded from the parent run's own materialization,
/// frontier, and status computation.
fn is_fanout_body(definition: &WorkflowDefinition, step_id: &str) -> bool {
    definition.steps.iter().any(|s| {
        matches!(&s.kind, StepKind::Fanout { body_step_id } if body_step_id == step_id)
    })
}

/// Recomputes run status from step statuses (spec §4.E lifecycle step 5).
fn recompute_run_status(definition: &WorkflowDefinition, steps: &[WorkflowRunStep]) -> RunStatus {
    let by_id: HashMap<&str, &WorkflowRunStep> =
        steps.iter().map(|s| (s.step_id.as_str(), s)).collect();

    let relevant = || definition.steps.iter().filter(|s| !is_fanout_body(definition, &s.step_id));

    let any_failed = relevant()
        .any(|s| by_id.get(s.step_id.as_str()).map(|st| st.status == StepStatus::Failed).unwrap_or(false));
    if any_failed {
        return RunStatus::Failed;
    }

    let all_terminal = relevant().all(|s| {
        by_id
            .get(s.step_id.as_str())
            .map(|st| matches!(st.status, StepStatus::Succeeded | StepStatus::Skipped))
            .unwrap_or(false)
    });
    if all_terminal {
        return RunStatus::Succeeded;
    }

    RunStatus::Running
}

/// Cancels a run (spec §4.E "Cancellation"): transitions to `canceled` and
/// every non-terminal step to `skipped`. In-flight dispatches are not
/// aborted mid-flight; no further advancement occurs.
pub async fn cancel_run(
    repository: &dyn WorkflowRepository,
    run_id: &str,
) -> Result<WorkflowRun, OrchestratorError> {
    let mut run = repository
        .get_run(run_id)
        .await?
        .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))?;

    if run.status.is_terminal() {
        return Ok(run);
    }

    for mut step in repository.list_steps(run_id).await? {
        if step.status != StepStatus::Succeeded && step.status != StepStatus::Failed {
            step.status = StepStatus::Skipped;
            step.next_attempt_at = None;
            repository.put_step(step).await?;
        }
    }

    run.status = RunStatus::Canceled;
    run.completed_at = Some(Utc::now());
    repository.put_run(run.clone()).await?;
    Ok(run)
}
