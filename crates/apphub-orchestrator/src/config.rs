use std::env;
use std::time::Duration;

use apphub_core::error::{CoreError, Result};
use apphub_core::workflow::RetryPolicySpec;

/// Process-wide fallback applied when a step omits its own retry policy
/// (spec §4.E "If absent, a process-wide default applies (also
/// configurable)").
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_retry_policy: RetryPolicySpec,
    pub default_service_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_retry_policy: RetryPolicySpec::default(),
            default_service_timeout: Duration::from_secs(30),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_env_u32("WORKFLOW_DEFAULT_MAX_ATTEMPTS")? {
            config.default_retry_policy.max_attempts = v;
        }
        if let Some(v) = parse_env_u64("WORKFLOW_DEFAULT_INITIAL_DELAY_MS")? {
            config.default_retry_policy.initial_delay_ms = v;
        }
        if let Some(v) = parse_env_u64("WORKFLOW_DEFAULT_MAX_DELAY_MS")? {
            config.default_retry_policy.max_delay_ms = v;
        }
        if let Some(v) = parse_env_u64("WORKFLOW_SERVICE_STEP_TIMEOUT_MS")? {
            config.default_service_timeout = Duration::from_millis(v);
        }
        Ok(config)
    }
}

fn parse_env_u32(name: &str) -> Result<Option<u32>> {
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|e| CoreError::configuration(format!("{name} is not a valid u32: {e}"))),
    }
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
