use async_trait::async_trait;

use crate::error::Result;
use crate::event::{EventEnvelope, EventListQuery, EventPage};
use crate::service::ServiceRecord;
use crate::trigger::{EventTrigger, TriggerDelivery};
use crate::workflow::{WorkflowDefinition, WorkflowRun, WorkflowRunStep};

/// Typed interface the Event Envelope Bus persists through. Cross-subsystem
/// interactions go through interfaces like this one, never shared mutable
/// memory (spec §3 "Ownership summary").
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Inserts `envelope`. Returns `Ok(true)` if newly inserted, `Ok(false)`
    /// if `envelope.id` already existed (spec §4.B: "duplicates by id are
    /// silently dropped").
    async fn insert(&self, envelope: EventEnvelope) -> Result<bool>;

    async fn get(&self, id: &str) -> Result<Option<EventEnvelope>>;

    async fn list(&self, query: EventListQuery) -> Result<EventPage>;
}

/// Exclusively owned by the orchestrator (spec §3 "Ownership summary").
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn get_definition(&self, slug: &str) -> Result<Option<WorkflowDefinition>>;
    async fn put_definition(&self, definition: WorkflowDefinition) -> Result<()>;
    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>>;

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>>;
    async fn put_run(&self, run: WorkflowRun) -> Result<()>;
    async fn find_non_terminal_run_by_key(
        &self,
        definition_id: &str,
        run_key_normalized: &str,
    ) -> Result<Option<WorkflowRun>>;
    async fn list_runs(&self, definition_id: &str, limit: usize) -> Result<Vec<WorkflowRun>>;

    async fn get_step(&self, run_id: &str, step_id: &str) -> Result<Option<WorkflowRunStep>>;
    async fn put_step(&self, step: WorkflowRunStep) -> Result<()>;
    async fn list_steps(&self, run_id: &str) -> Result<Vec<WorkflowRunStep>>;
}

/// Exclusively owned by the trigger processor (spec §3 "Ownership summary").
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    async fn get_trigger(&self, id: &str) -> Result<Option<EventTrigger>>;
    async fn put_trigger(&self, trigger: EventTrigger) -> Result<()>;
    async fn list_triggers_for_event(
        &self,
        event_type: &str,
        event_source: &str,
    ) -> Result<Vec<EventTrigger>>;

    async fn get_delivery(&self, id: &str) -> Result<Option<TriggerDelivery>>;
    async fn put_delivery(&self, delivery: TriggerDelivery) -> Result<()>;
    async fn find_delivery_by_idempotency_key(
        &self,
        trigger_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<TriggerDelivery>>;
    async fn count_launched_in_window(
        &self,
        trigger_id: &str,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<u32>;
    async fn count_non_terminal_launched(&self, trigger_id: &str) -> Result<u32>;
}

/// Exclusively owned by the service registry (spec §3 "Ownership summary").
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn get(&self, slug: &str) -> Result<Option<ServiceRecord>>;
    async fn put(&self, record: ServiceRecord) -> Result<()>;
    async fn list(&self) -> Result<Vec<ServiceRecord>>;
    async fn find_slug_by_repository_id(&self, repository_id: &str) -> Result<Option<String>>;
}

/// Request to materialize a new workflow run. The trigger processor (and
/// any manual/schedule caller) only ever asks the orchestrator to launch a
/// run through this interface — it never writes `WorkflowRun` rows itself,
/// since the orchestrator exclusively owns workflow-run mutable state
/// (spec §3 "Ownership summary").
#[derive(Debug, Clone)]
pub struct LaunchWorkflowRequest {
    pub workflow_definition_slug: String,
    pub parameters: serde_json::Value,
    pub triggered_by: crate::workflow::TriggeredBy,
    pub partition_key: Option<String>,
    pub run_key: Option<String>,
    pub module_id: Option<String>,
}

#[async_trait]
pub trait WorkflowLauncher: Send + Sync {
    async fn launch(&self, request: LaunchWorkflowRequest) -> Result<WorkflowRun>;
}
