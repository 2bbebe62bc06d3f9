use std::collections::HashMap;

use apphub_core::error::Result;
use apphub_core::repository::WorkflowRepository;
use apphub_core::workflow::{WorkflowDefinition, WorkflowRun, WorkflowRunStep};
use async_trait::async_trait;
use parking_lot::RwLock;

/// In-memory workflow-definition/run/step store, mirroring
/// `durable::persistence::InMemoryWorkflowEventStore`'s map-of-maps style.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
    runs: RwLock<HashMap<String, WorkflowRun>>,
    steps: RwLock<HashMap<(String, String), WorkflowRunStep>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.definitions.write().clear();
        self.runs.write().clear();
        self.steps.write().clear();
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get_definition(&self, slug: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.definitions.read().get(slug).cloned())
    }

    async fn put_definition(&self, definition: WorkflowDefinition) -> Result<()> {
        self.definitions
            .write()
            .insert(definition.slug.clone(), definition);
        Ok(())
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        Ok(self.definitions.read().values().cloned().collect())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        Ok(self.runs.read().get(run_id).cloned())
    }

    async fn put_run(&self, run: WorkflowRun) -> Result<()> {
        self.runs.write().insert(run.id.clone(), run);
        Ok(())
    }

    async fn find_non_terminal_run_by_key(
        &self,
        definition_id: &str,
        run_key_normalized: &str,
    ) -> Result<Option<WorkflowRun>> {
        Ok(self
            .runs
            .read()
            .values()
            .find(|r| {
                r.workflow_definition_id == definition_id
                    && r.run_key_normalized.as_deref() == Some(run_key_normalized)
                    && !r.status.is_terminal()
            })
            .cloned())
    }

    async fn list_runs(&self, definition_id: &str, limit: usize) -> Result<Vec<WorkflowRun>> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .read()
            .values()
            .filter(|r| r.workflow_definition_id == definition_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn get_step(&self, run_id: &str, step_id: &str) -> Result<Option<WorkflowRunStep>> {
        Ok(self
            .steps
            .read()
            .get(&(run_id.to_string(), step_id.to_string()))
            .cloned())
    }

    async fn put_step(&self, step: WorkflowRunStep) -> Result<()> {
        self.steps
            .write()
            .insert((step.run_id.clone(), step.step_id.clone()), step);
        Ok(())
    }

    async fn list_steps(&self, run_id: &str) -> Result<Vec<WorkflowRunStep>> {
        Ok(self
            .steps
            .read()
            .values()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect())
    }
}
