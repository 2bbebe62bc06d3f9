mod retry_ticker;
mod service_resolver;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use apphub_core::repository::WorkflowRepository;
use apphub_events::{EventBus, InMemoryEventRepository};
use apphub_module_context::ModuleContextIndex;
use apphub_orchestrator::{
    InMemoryWorkflowRepository, JobRegistry, Orchestrator, OrchestratorConfig, WORKFLOW_QUEUE,
    WORKFLOW_RETRY_QUEUE,
};
use apphub_queue::{JobOptions, QueueManager, QueueManagerConfig};
use apphub_registry::{InMemoryServiceRepository, RegistryConfig, ServiceRegistry};
use apphub_scheduler::{SchedulerConfig, SchedulerState};
use apphub_triggers::{TriggerProcessor, EVENT_TRIGGER_QUEUE};
use service_resolver::RegistryServiceResolver;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Assembles the nine library crates into one running process and owns the
/// background tickers that stand in for an external queue consumer (spec
/// §1's "background job workers" and "trigger/workflow retry schedulers"
/// are out-of-scope collaborators; this binary is the reference wiring a
/// collaborator would plug real ones into).
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let queue_config = QueueManagerConfig::from_env().context("loading queue configuration")?;
    let orchestrator_config =
        OrchestratorConfig::from_env().context("loading orchestrator configuration")?;
    let scheduler_config = SchedulerConfig::from_env().context("loading scheduler configuration")?;
    let registry_config = RegistryConfig::from_env().context("loading registry configuration")?;

    let queue = Arc::new(QueueManager::new(queue_config));
    queue
        .register_queue(WORKFLOW_QUEUE, JobOptions::default())
        .context("registering workflow queue")?;
    queue
        .register_queue(WORKFLOW_RETRY_QUEUE, JobOptions::default())
        .context("registering workflow retry queue")?;
    queue
        .register_queue(EVENT_TRIGGER_QUEUE, JobOptions::default())
        .context("registering event trigger queue")?;

    let workflow_repository: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
    let event_repository = Arc::new(InMemoryEventRepository::new());
    let trigger_repository = Arc::new(apphub_triggers::InMemoryTriggerRepository::new());
    let service_repository = Arc::new(InMemoryServiceRepository::new());

    let service_registry = ServiceRegistry::new(service_repository, registry_config);
    let module_context = Arc::new(ModuleContextIndex::new());

    let jobs = Arc::new(JobRegistry::new());
    let service_resolver = Arc::new(RegistryServiceResolver::new(Arc::clone(&service_registry)));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&workflow_repository),
        jobs,
        service_resolver,
        Arc::clone(&queue),
        orchestrator_config,
    ));

    let scheduler = Arc::new(SchedulerState::new(scheduler_config));
    // `_event_bus`/`_trigger_processor` are the ingestion pipeline's entry
    // points (`EventBus::ingest` → `TriggerProcessor::process_envelope`).
    // Feeding them from a real event source (webhook receiver, message
    // broker consumer) is an out-of-scope collaborator; this binary only
    // owns the pieces downstream of ingestion.
    let _event_bus = EventBus::new(event_repository);
    let _trigger_processor = TriggerProcessor::new(
        trigger_repository,
        Arc::clone(&orchestrator),
        scheduler,
        Arc::clone(&queue),
    );
    let _module_context = module_context;

    service_registry.start();
    info!("service registry health poller started");

    let retry_handle = spawn_retry_ticker(Arc::clone(&workflow_repository), Arc::clone(&orchestrator));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");

    retry_handle.abort();
    service_registry.shutdown().await;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Spec §4.E's inline-mode retry substitute (see `retry_ticker` docs) run on
/// a fixed interval rather than the queue's own retry-queue delay semantics,
/// since there is no consumer to honor per-job delays with.
fn spawn_retry_ticker(
    repository: Arc<dyn WorkflowRepository>,
    orchestrator: Arc<Orchestrator>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            retry_ticker::run_once(repository.as_ref(), orchestrator.as_ref()).await;
        }
    })
}
