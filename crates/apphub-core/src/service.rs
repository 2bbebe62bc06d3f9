use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BaseUrlSource {
    Manifest,
    Runtime,
    Env,
    Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvBinding {
    Literal { key: String, value: String },
    FromService {
        key: String,
        from_service: FromServiceRef,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromServiceRef {
    pub service: String,
    pub property: String,
    pub fallback: Option<String>,
}

/// A declarative service description, merged from one or more sources
/// (spec §3 "Service manifest entry", GLOSSARY "Manifest entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceManifestEntry {
    pub slug: String,
    pub display_name: String,
    pub kind: String,
    pub base_url: Option<String>,
    pub base_url_source: BaseUrlSource,
    pub health_endpoint: String,
    pub openapi_path: Option<String>,
    pub env: Vec<EnvBinding>,
    pub capabilities: Vec<String>,
    pub tags: Vec<String>,
    pub module_id: Option<String>,
    pub module_version: Option<String>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unreachable,
    Running,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRuntimeSnapshot {
    pub repository_id: Option<String>,
    pub launch_id: Option<String>,
    pub instance_url: Option<String>,
    pub base_url: Option<String>,
    pub preview_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub container_ip: Option<String>,
    pub container_port: Option<u16>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: ServiceStatus,
    pub checked_at: DateTime<Utc>,
    pub probed_url: Option<String>,
    pub message: Option<String>,
}

/// The persistent, observable state of a service (spec §3 "Service record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub slug: String,
    pub status: ServiceStatus,
    pub status_message: Option<String>,
    pub manifest: ServiceManifestEntry,
    pub runtime: ServiceRuntimeSnapshot,
    pub latest_health: Option<HealthSnapshot>,
    pub latest_openapi_hash: Option<String>,
    pub linked_apps: Vec<String>,
    pub capabilities: Vec<String>,
}

impl ServiceRecord {
    /// Clears runtime metadata only if `expected_launch_id` matches the
    /// recorded one, guarding against stale teardown races (spec §3
    /// invariant, §4.F `clearServiceRuntimeForRepository`).
    pub fn clear_runtime_if_launch_matches(&mut self, expected_launch_id: &str) -> bool {
        if self.runtime.launch_id.as_deref() == Some(expected_launch_id) {
            self.runtime = ServiceRuntimeSnapshot::default();
            true
        } else {
            false
        }
    }
}

/// Computes the environment-variable override name for a service slug
/// (spec §3: `SERVICE_<UPPER_SLUG>_BASE_URL`).
pub fn env_override_var_name(slug: &str) -> String {
    format!(
        "SERVICE_{}_BASE_URL",
        slug.to_uppercase().replace('-', "_")
    )
}

/// Merges manifest sources deterministically: later sources override
/// earlier within the same module; env overrides win over all manifest
/// sources (spec §3 "Merged deterministically").
pub fn merge_manifest_sources(
    sources: Vec<ServiceManifestEntry>,
    env_lookup: &HashMap<String, String>,
) -> Option<ServiceManifestEntry> {
    let mut merged = sources.into_iter().fold(None, |acc: Option<ServiceManifestEntry>, next| {
        match acc {
            None => Some(next),
            Some(mut current) => {
                current.display_name = next.display_name;
                current.kind = next.kind;
                if next.base_url.is_some() {
                    current.base_url = next.base_url;
                    current.base_url_source = next.base_url_source;
                }
                current.health_endpoint = next.health_endpoint;
                current.openapi_path = next.openapi_path.or(current.openapi_path);
                current.env = next.env;
                current.capabilities = next.capabilities;
                current.tags = next.tags;
                current.module_id = next.module_id.or(current.module_id);
                current.module_version = next.module_version.or(current.module_version);
                current.sources.extend(next.sources);
                Some(current)
            }
        }
    })?;

    let override_var = env_override_var_name(&merged.slug);
    if let Some(value) = env_lookup.get(&override_var) {
        merged.base_url = Some(value.clone());
        merged.base_url_source = BaseUrlSource::Env;
        merged.sources.push("env".to_string());
    }

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(slug: &str, base_url: &str, source: &str) -> ServiceManifestEntry {
        ServiceManifestEntry {
            slug: slug.to_string(),
            display_name: "Foo".into(),
            kind: "http".into(),
            base_url: Some(base_url.to_string()),
            base_url_source: BaseUrlSource::Manifest,
            health_endpoint: "/healthz".into(),
            openapi_path: None,
            env: Vec::new(),
            capabilities: Vec::new(),
            tags: Vec::new(),
            module_id: None,
            module_version: None,
            sources: vec![source.to_string()],
        }
    }

    #[test]
    fn env_override_wins_over_manifest_sources() {
        let mut env = HashMap::new();
        env.insert("SERVICE_FOO_BASE_URL".to_string(), "http://b".to_string());
        let merged = merge_manifest_sources(vec![entry("foo", "http://a", "manifest")], &env)
            .expect("merged");
        assert_eq!(merged.base_url.as_deref(), Some("http://b"));
        assert_eq!(merged.base_url_source, BaseUrlSource::Env);
    }

    #[test]
    fn later_source_overrides_earlier_without_env() {
        let env = HashMap::new();
        let merged = merge_manifest_sources(
            vec![entry("foo", "http://a", "m1"), entry("foo", "http://c", "m2")],
            &env,
        )
        .expect("merged");
        assert_eq!(merged.base_url.as_deref(), Some("http://c"));
        assert_eq!(merged.sources, vec!["m1", "m2"]);
    }

    #[test]
    fn env_var_name_upcases_and_replaces_dashes() {
        assert_eq!(env_override_var_name("my-service"), "SERVICE_MY_SERVICE_BASE_URL");
    }

    #[test]
    fn clearing_runtime_requires_matching_launch_id() {
        let mut record = ServiceRecord {
            slug: "foo".into(),
            status: ServiceStatus::Healthy,
            status_message: None,
            manifest: entry("foo", "http://a", "manifest"),
            runtime: ServiceRuntimeSnapshot {
                launch_id: Some("launch-1".into()),
                ..Default::default()
            },
            latest_health: None,
            latest_openapi_hash: None,
            linked_apps: Vec::new(),
            capabilities: Vec::new(),
        };
        assert!(!record.clear_runtime_if_launch_matches("launch-2"));
        assert!(record.runtime.launch_id.is_some());
        assert!(record.clear_runtime_if_launch_matches("launch-1"));
        assert!(record.runtime.launch_id.is_none());
    }
}
