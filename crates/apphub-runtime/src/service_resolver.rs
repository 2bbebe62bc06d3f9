use std::sync::Arc;

use apphub_orchestrator::ServiceResolver;
use async_trait::async_trait;

/// Adapts `apphub-registry`'s `ServiceRegistry` to the orchestrator's
/// `ServiceResolver` seam (`apphub-orchestrator::service_client` names this
/// crate as "the real implementor"). Resolution prefers the
/// highest-priority health candidate over the bare manifest URL, so a bound
/// runtime instance wins over a merely-declared one.
pub struct RegistryServiceResolver {
    registry: Arc<apphub_registry::ServiceRegistry>,
}

impl RegistryServiceResolver {
    pub fn new(registry: Arc<apphub_registry::ServiceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ServiceResolver for RegistryServiceResolver {
    async fn resolve_base_url(&self, service_slug: &str) -> Option<String> {
        let record = self.registry.get_service(service_slug).await.ok()?;
        let containerized = self.registry.config().containerized;
        apphub_registry::health::candidate_urls(&record, containerized)
            .into_iter()
            .next()
    }
}
