use std::collections::HashMap;
use std::time::Duration;

use apphub_core::service::ServiceManifestEntry;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Snapshot returned by `loadManifestState` (spec §4.F `manifestStateCache`).
#[derive(Debug, Clone)]
pub struct ManifestState {
    pub entries: HashMap<String, ServiceManifestEntry>,
    pub networks: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Short-TTL cache fronting the service repository, invalidated either by
/// TTL expiry or by an explicit `{force: true}` reload (spec §4.F). Process
/// local, like every other cache in this workspace (spec §9 "Pub/sub for
/// cache coherence": "rely on the broadcast channel and a short TTL").
#[derive(Default)]
pub struct ManifestStateCache {
    state: RwLock<Option<ManifestState>>,
}

impl ManifestStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached state if present and not yet expired as of `now`.
    pub fn get(&self, now: DateTime<Utc>) -> Option<ManifestState> {
        self.state
            .read()
            .as_ref()
            .filter(|state| state.expires_at > now)
            .cloned()
    }

    pub fn set(
        &self,
        entries: HashMap<String, ServiceManifestEntry>,
        networks: Vec<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> ManifestState {
        let state = ManifestState {
            entries,
            networks,
            fetched_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        };
        *self.state.write() = Some(state.clone());
        state
    }

    /// Invalidation messages force the next read to miss (spec §4.F
    /// "invalidation messages ... force reload").
    pub fn invalidate(&self) {
        *self.state.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_when_empty() {
        let cache = ManifestStateCache::new();
        assert!(cache.get(Utc::now()).is_none());
    }

    #[test]
    fn hit_before_expiry_miss_after() {
        let cache = ManifestStateCache::new();
        let now = Utc::now();
        cache.set(HashMap::new(), Vec::new(), now, Duration::from_secs(5));
        assert!(cache.get(now + chrono::Duration::seconds(1)).is_some());
        assert!(cache.get(now + chrono::Duration::seconds(10)).is_none());
    }

    #[test]
    fn invalidate_forces_a_miss_within_ttl() {
        let cache = ManifestStateCache::new();
        let now = Utc::now();
        cache.set(HashMap::new(), Vec::new(), now, Duration::from_secs(60));
        cache.invalidate();
        assert!(cache.get(now).is_none());
    }
}
