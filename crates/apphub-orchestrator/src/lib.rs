//! Interprets `WorkflowDefinition` step DAGs, advances runs to completion,
//! and owns all workflow-run and workflow-run-step mutable state (spec §3
//! "Ownership summary", §4.E "Workflow Orchestrator").

pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod retry;
pub mod service_client;

pub use config::OrchestratorConfig;
pub use engine::{cancel_run, OrchestrationResult, Orchestrator, WORKFLOW_QUEUE, WORKFLOW_RETRY_QUEUE};
pub use error::OrchestratorError;
pub use jobs::{JobHandler, JobOutcome, JobRegistry};
pub use memory::InMemoryWorkflowRepository;
pub use service_client::{ServiceResolver, StaticServiceResolver};
