use std::sync::Arc;

use apphub_core::repository::WorkflowRepository;
use apphub_orchestrator::Orchestrator;
use tracing::{error, warn};

/// In queue mode a real worker consumes `WORKFLOW_RETRY_QUEUE` and re-invokes
/// `runWorkflowOrchestration` when a step's delay elapses. This process has
/// no such worker (the in-memory transport this core ships records queue
/// statistics but never dequeues — see DESIGN.md), so this ticker is the
/// inline-mode substitute spec §4.E calls for: "the caller is responsible
/// for re-invoking orchestration after the delay". It re-scans every
/// non-terminal run on each tick; `run_workflow_orchestration` itself is the
/// one that no-ops when nothing is actually due yet.
pub async fn run_once(repository: &dyn WorkflowRepository, orchestrator: &Orchestrator) {
    let definitions = match repository.list_definitions().await {
        Ok(defs) => defs,
        Err(err) => {
            error!(%err, "retry ticker: failed to list workflow definitions");
            return;
        }
    };

    for definition in definitions {
        let runs = match repository.list_runs(&definition.slug, 1_000).await {
            Ok(runs) => runs,
            Err(err) => {
                error!(%err, slug = %definition.slug, "retry ticker: failed to list runs");
                continue;
            }
        };

        for run in runs {
            if run.status.is_terminal() {
                continue;
            }
            if let Err(err) = orchestrator.run_workflow_orchestration(&run.id).await {
                warn!(%err, run_id = %run.id, "retry ticker: orchestration pass failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apphub_core::repository::{LaunchWorkflowRequest, WorkflowLauncher};
    use apphub_core::workflow::{
        RunStatus, StepKind, StepStatus, TriggeredBy, WorkflowDefinition, WorkflowStepDefinition,
    };
    use apphub_orchestrator::{
        InMemoryWorkflowRepository, JobHandler, JobOutcome, JobRegistry, OrchestratorConfig,
        StaticServiceResolver,
    };
    use apphub_queue::{QueueManager, QueueManagerConfig};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct Noop;

    #[async_trait]
    impl JobHandler for Noop {
        async fn handle(&self, parameters: serde_json::Value) -> JobOutcome {
            JobOutcome::Succeeded { result: parameters }
        }
    }

    fn job_step(id: &str, deps: &[&str]) -> WorkflowStepDefinition {
        WorkflowStepDefinition {
            step_id: id.to_string(),
            display_name: id.to_string(),
            kind: StepKind::Job {
                job_slug: "noop".to_string(),
                parameters: serde_json::Value::Null,
            },
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            retry_policy: None,
            partitioning: None,
            produces: Vec::new(),
            consumes: Vec::new(),
            continue_on_skip: false,
        }
    }

    /// Two dependent steps: `launch` only completes `fetch` (no deps)
    /// synchronously, leaving `load` eligible on the *next* pass — which is
    /// exactly the pass `run_once` is responsible for supplying.
    fn definition() -> WorkflowDefinition {
        WorkflowDefinition {
            slug: "pipeline".to_string(),
            version: 1,
            steps: vec![job_step("fetch", &[]), job_step("load", &["fetch"])],
            triggers: Vec::new(),
            parameters_schema: serde_json::Value::Null,
            default_parameters: serde_json::Value::Null,
            output_schema: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn empty_repository_is_a_noop() {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        let queue = Arc::new(QueueManager::new(QueueManagerConfig::inline_for_tests()));
        let resolver = Arc::new(StaticServiceResolver::new(HashMap::new()));
        let orchestrator = Orchestrator::new(
            repository.clone(),
            Arc::new(JobRegistry::new()),
            resolver,
            queue,
            OrchestratorConfig::default(),
        );
        run_once(repository.as_ref(), &orchestrator).await;
    }

    #[tokio::test]
    async fn advances_a_non_terminal_run_and_skips_terminal_ones() {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        repository.put_definition(definition()).await.unwrap();
        let queue = Arc::new(QueueManager::new(QueueManagerConfig::inline_for_tests()));
        let resolver = Arc::new(StaticServiceResolver::new(HashMap::new()));
        let mut jobs = JobRegistry::new();
        jobs.register("noop", Arc::new(Noop));
        let orchestrator = Orchestrator::new(
            repository.clone(),
            Arc::new(jobs),
            resolver,
            queue,
            OrchestratorConfig::default(),
        );

        let run = orchestrator
            .launch(LaunchWorkflowRequest {
                workflow_definition_slug: "pipeline".to_string(),
                parameters: serde_json::Value::Null,
                triggered_by: TriggeredBy::Manual,
                partition_key: None,
                run_key: None,
                module_id: None,
            })
            .await
            .unwrap();
        assert_ne!(run.status, RunStatus::Succeeded);

        // `run_once` is what supplies the second pass `load` needs.
        run_once(repository.as_ref(), &orchestrator).await;

        let advanced = repository.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(advanced.status, RunStatus::Succeeded);

        let steps = repository.list_steps(&run.id).await.unwrap();
        assert!(steps.iter().all(|s| s.status == StepStatus::Succeeded));
    }
}
