use std::env;
use std::time::Duration;

use apphub_core::error::{CoreError, Result};

/// Environment knobs from spec §6 ("`SERVICE_*`" group), following the same
/// `*Config::from_env()` style as every other crate's configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub health_interval: Duration,
    pub health_timeout: Duration,
    pub openapi_refresh_interval: Duration,
    pub cache_ttl: Duration,
    pub health_cache_ttl: Duration,
    /// Whether the registry process is itself containerized (spec §4.F
    /// "Loopback hosts are rewritten to `host.docker.internal` when the
    /// registry is itself containerized").
    pub containerized: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_millis(30_000),
            health_timeout: Duration::from_millis(5_000),
            openapi_refresh_interval: Duration::from_millis(900_000),
            cache_ttl: Duration::from_millis(5_000),
            health_cache_ttl: Duration::from_millis(10_000),
            containerized: false,
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_env_u64("SERVICE_HEALTH_INTERVAL_MS")? {
            config.health_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_env_u64("SERVICE_HEALTH_TIMEOUT_MS")? {
            config.health_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_env_u64("SERVICE_OPENAPI_REFRESH_INTERVAL_MS")? {
            config.openapi_refresh_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_env_u64("SERVICE_REGISTRY_CACHE_TTL_MS")? {
            config.cache_ttl = Duration::from_millis(v);
        }
        if let Some(v) = parse_env_u64("SERVICE_HEALTH_CACHE_TTL_MS")? {
            config.health_cache_ttl = Duration::from_millis(v);
        }
        config.containerized = truthy(env::var("APPHUB_REGISTRY_CONTAINERIZED").ok());
        Ok(config)
    }
}

fn truthy(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_lowercase).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

fn parse_env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| CoreError::configuration(format!("{name} is not a valid u64: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let config = RegistryConfig::default();
        assert_eq!(config.health_interval, Duration::from_secs(30));
        assert_eq!(config.health_timeout, Duration::from_secs(5));
        assert_eq!(config.openapi_refresh_interval, Duration::from_millis(900_000));
        assert_eq!(config.cache_ttl, Duration::from_millis(5_000));
        assert_eq!(config.health_cache_ttl, Duration::from_millis(10_000));
        assert!(!config.containerized);
    }
}
