use std::collections::HashMap;

use apphub_core::error::Result;
use apphub_core::repository::ServiceRepository;
use apphub_core::service::ServiceRecord;
use async_trait::async_trait;
use parking_lot::RwLock;

/// In-memory service record store, mirroring
/// `durable::persistence::InMemoryWorkflowEventStore`'s map style.
#[derive(Default)]
pub struct InMemoryServiceRepository {
    records: RwLock<HashMap<String, ServiceRecord>>,
}

impl InMemoryServiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn get(&self, slug: &str) -> Result<Option<ServiceRecord>> {
        Ok(self.records.read().get(slug).cloned())
    }

    async fn put(&self, record: ServiceRecord) -> Result<()> {
        self.records.write().insert(record.slug.clone(), record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ServiceRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn find_slug_by_repository_id(&self, repository_id: &str) -> Result<Option<String>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.runtime.repository_id.as_deref() == Some(repository_id))
            .map(|r| r.slug.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apphub_core::service::{BaseUrlSource, ServiceManifestEntry, ServiceRuntimeSnapshot, ServiceStatus};

    fn record(slug: &str, repository_id: Option<&str>) -> ServiceRecord {
        ServiceRecord {
            slug: slug.to_string(),
            status: ServiceStatus::Unknown,
            status_message: None,
            manifest: ServiceManifestEntry {
                slug: slug.to_string(),
                display_name: "Foo".to_string(),
                kind: "http".to_string(),
                base_url: None,
                base_url_source: BaseUrlSource::Manifest,
                health_endpoint: "/healthz".to_string(),
                openapi_path: None,
                env: Vec::new(),
                capabilities: Vec::new(),
                tags: Vec::new(),
                module_id: None,
                module_version: None,
                sources: Vec::new(),
            },
            runtime: ServiceRuntimeSnapshot {
                repository_id: repository_id.map(str::to_string),
                ..Default::default()
            },
            latest_health: None,
            latest_openapi_hash: None,
            linked_apps: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    #[tokio::test]
    async fn round_trips_by_slug() {
        let repo = InMemoryServiceRepository::new();
        repo.put(record("foo", None)).await.unwrap();
        assert!(repo.get("foo").await.unwrap().is_some());
        assert!(repo.get("ghost").await.unwrap().is_none());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn finds_slug_by_repository_id() {
        let repo = InMemoryServiceRepository::new();
        repo.put(record("foo", Some("repo-1"))).await.unwrap();
        repo.put(record("bar", Some("repo-2"))).await.unwrap();

        assert_eq!(
            repo.find_slug_by_repository_id("repo-1").await.unwrap(),
            Some("foo".to_string())
        );
        assert!(repo
            .find_slug_by_repository_id("repo-unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let repo = InMemoryServiceRepository::new();
        repo.put(record("foo", None)).await.unwrap();
        repo.clear();
        assert!(repo.list().await.unwrap().is_empty());
    }
}
