use std::collections::HashMap;
use std::sync::Arc;

use apphub_core::error::Result as CoreResult;
use apphub_core::repository::ServiceRepository;
use apphub_core::service::{ServiceManifestEntry, ServiceRecord, ServiceRuntimeSnapshot};
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cache::{ManifestState, ManifestStateCache};
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::health::probe_service;
use crate::invalidation::{InvalidationBus, InvalidationKind, InvalidationMessage};
use crate::openapi;
use crate::runtime_binding;

/// Ties together the manifest cache, health poller, OpenAPI refresh, and
/// invalidation bus behind one handle (spec §4.F). Background loops follow
/// the same spawn-plus-watch-channel-shutdown shape as
/// `durable::worker::pool::WorkerPool`.
pub struct ServiceRegistry {
    repository: Arc<dyn ServiceRepository>,
    config: RegistryConfig,
    manifest_cache: ManifestStateCache,
    invalidation: InvalidationBus,
    http_client: reqwest::Client,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    health_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    openapi_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ServiceRegistry {
    pub fn new(repository: Arc<dyn ServiceRepository>, config: RegistryConfig) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            repository,
            config,
            manifest_cache: ManifestStateCache::new(),
            invalidation: InvalidationBus::default(),
            http_client: reqwest::Client::new(),
            shutdown_tx,
            shutdown_rx,
            health_handle: std::sync::Mutex::new(None),
            openapi_handle: std::sync::Mutex::new(None),
        })
    }

    pub fn subscribe_invalidations(&self) -> tokio::sync::broadcast::Receiver<InvalidationMessage> {
        self.invalidation.subscribe()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the cached manifest snapshot unless it's expired or `force`
    /// is set, in which case it rebuilds it from the repository (spec §4.F
    /// `loadManifestState`).
    pub async fn load_manifest_state(&self, force: bool) -> CoreResult<ManifestState> {
        let now = Utc::now();
        if !force {
            if let Some(state) = self.manifest_cache.get(now) {
                return Ok(state);
            }
        }

        let records = self.repository.list().await?;
        let entries: HashMap<String, ServiceManifestEntry> = records
            .into_iter()
            .map(|record| (record.slug.clone(), record.manifest))
            .collect();
        let networks = Vec::new();
        Ok(self.manifest_cache.set(entries, networks, now, self.config.cache_ttl))
    }

    pub async fn get_service(&self, slug: &str) -> Result<ServiceRecord, RegistryError> {
        self.repository
            .get(slug)
            .await?
            .ok_or_else(|| RegistryError::ServiceNotFound(slug.to_string()))
    }

    pub async fn list_services(&self) -> CoreResult<Vec<ServiceRecord>> {
        self.repository.list().await
    }

    /// Spec §4.F `updateServiceRuntimeForRepository`.
    pub async fn update_service_runtime_for_repository(
        &self,
        repository_id: &str,
        snapshot: ServiceRuntimeSnapshot,
    ) -> Result<ServiceRecord, RegistryError> {
        let slug = self
            .repository
            .find_slug_by_repository_id(repository_id)
            .await?
            .ok_or_else(|| RegistryError::UnknownRepository(repository_id.to_string()))?;
        let mut record = self.get_service(&slug).await?;
        runtime_binding::apply_runtime_update(&mut record, snapshot);
        self.repository.put(record.clone()).await?;
        self.manifest_cache.invalidate();
        self.invalidation.publish(InvalidationMessage {
            kind: InvalidationKind::Manifest,
            reason: "runtime bound".to_string(),
            slug: Some(slug.clone()),
            module_id: None,
        });

        // Best-effort immediate health check so a freshly-bound runtime
        // doesn't sit at `running` until the next poll tick (spec §4.F).
        match self.check_health_now(record.clone()).await {
            Ok(checked) => record = checked,
            Err(err) => warn!(%slug, %err, "immediate health check after runtime bind failed"),
        }

        Ok(record)
    }

    /// Probes a single service's health right away and persists the result.
    /// Used for the immediate post-bind check; the periodic loop uses
    /// `run_health_cycle` instead.
    async fn check_health_now(&self, mut record: ServiceRecord) -> CoreResult<ServiceRecord> {
        let slug = record.slug.clone();
        let previous_status = record.status;
        let health = probe_service(
            &self.http_client,
            &record,
            self.config.health_timeout,
            self.config.containerized,
        )
        .await;
        record.status = health.status;
        record.status_message = health.message.clone();
        record.latest_health = Some(health);
        self.repository.put(record.clone()).await?;

        if previous_status != record.status {
            self.invalidation.publish(InvalidationMessage {
                kind: InvalidationKind::Health,
                reason: "status changed".to_string(),
                slug: Some(slug),
                module_id: None,
            });
        }
        Ok(record)
    }

    /// Spec §4.F `clearServiceRuntimeForRepository` — a no-op, not an error,
    /// when `launch_id` no longer matches (the launch was already
    /// superseded).
    pub async fn clear_service_runtime_for_repository(
        &self,
        repository_id: &str,
        launch_id: &str,
    ) -> Result<bool, RegistryError> {
        let Some(slug) = self.repository.find_slug_by_repository_id(repository_id).await? else {
            return Ok(false);
        };
        let mut record = self.get_service(&slug).await?;
        let cleared = runtime_binding::clear_runtime(&mut record, launch_id);
        if cleared {
            self.repository.put(record).await?;
            self.manifest_cache.invalidate();
            self.invalidation.publish(InvalidationMessage {
                kind: InvalidationKind::Manifest,
                reason: "runtime cleared".to_string(),
                slug: Some(slug),
                module_id: None,
            });
        }
        Ok(cleared)
    }

    /// Probes every known service once and persists the observed health
    /// (spec §4.F "Health polling"). Also refreshes a service's OpenAPI hash
    /// when it declares an `openapi_path` and a candidate base URL resolves.
    pub async fn run_health_cycle(&self) -> CoreResult<()> {
        let records = self.repository.list().await?;
        for mut record in records {
            let slug = record.slug.clone();
            let health = probe_service(
                &self.http_client,
                &record,
                self.config.health_timeout,
                self.config.containerized,
            )
            .await;
            let status_changed = record.status != health.status;
            record.status = health.status;
            record.status_message = health.message.clone();
            record.latest_health = Some(health);

            if let Err(err) = self.refresh_openapi(&mut record).await {
                warn!(%slug, %err, "openapi refresh failed");
            }

            self.repository.put(record).await?;

            if status_changed {
                self.invalidation.publish(InvalidationMessage {
                    kind: InvalidationKind::Health,
                    reason: "status changed".to_string(),
                    slug: Some(slug),
                    module_id: None,
                });
            }
        }
        Ok(())
    }

    async fn refresh_openapi(&self, record: &mut ServiceRecord) -> Result<(), RegistryError> {
        let Some(path) = &record.manifest.openapi_path else {
            return Ok(());
        };
        let candidates = crate::health::candidate_urls(record, self.config.containerized);
        let Some(base) = candidates.first() else {
            return Ok(());
        };
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        let response = match self
            .http_client
            .get(&url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(%url, status = %response.status(), "openapi fetch returned non-2xx");
                return Ok(());
            }
            Err(err) => {
                debug!(%url, %err, "openapi fetch failed");
                return Ok(());
            }
        };
        let raw = response
            .bytes()
            .await
            .map_err(|e| RegistryError::InvalidOpenapi(e.to_string()))?;
        let canonical = openapi::canonicalize(&raw)?;
        let hash = openapi::hash(&canonical);
        if record.latest_openapi_hash.as_deref() != Some(hash.as_str()) {
            record.latest_openapi_hash = Some(hash);
            self.invalidation.publish(InvalidationMessage {
                kind: InvalidationKind::Manifest,
                reason: "openapi document changed".to_string(),
                slug: Some(record.slug.clone()),
                module_id: record.manifest.module_id.clone(),
            });
        }
        Ok(())
    }

    /// Spawns the background health-poll loop. Idempotent except for leaking
    /// a duplicate task if called twice; callers are expected to call this
    /// once at startup, mirroring `WorkerPool::start`.
    pub fn start(self: &Arc<Self>) {
        self.start_health_loop();
    }

    fn start_health_loop(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let interval = self.config.health_interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = registry.run_health_cycle().await {
                            error!(%err, "health cycle failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("health loop: shutdown requested");
                        break;
                    }
                }
            }
        });

        *self.health_handle.lock().unwrap() = Some(handle);
    }

    /// Signals shutdown and waits for the background loop to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.health_handle.lock().unwrap().take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.openapi_handle.lock().unwrap().take() {
            let _ = handle.await;
        }
    }
}
