use std::env;

use serde::Deserialize;

use apphub_core::error::{CoreError, Result};

/// `{source, limit, intervalMs, pauseMs}` entry from `EVENT_SOURCE_RATE_LIMITS`
/// (spec §4.C, §6). `source == "*"` is the wildcard fallback rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    pub source: String,
    pub limit: usize,
    pub interval_ms: u64,
    pub pause_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub rate_limit_rules: Vec<RateLimitRule>,
    pub trigger_error_threshold: u32,
    pub trigger_error_window_ms: u64,
    pub trigger_pause_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_limit_rules: Vec::new(),
            trigger_error_threshold: 5,
            trigger_error_window_ms: 300_000,
            trigger_pause_ms: 300_000,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("EVENT_SOURCE_RATE_LIMITS") {
            config.rate_limit_rules = serde_json::from_str(&raw).map_err(|e| {
                CoreError::configuration(format!("EVENT_SOURCE_RATE_LIMITS is not valid JSON: {e}"))
            })?;
        }
        if let Some(v) = parse_env_u32("EVENT_TRIGGER_ERROR_THRESHOLD")? {
            config.trigger_error_threshold = v;
        }
        if let Some(v) = parse_env_u64("EVENT_TRIGGER_ERROR_WINDOW_MS")? {
            config.trigger_error_window_ms = v;
        }
        if let Some(v) = parse_env_u64("EVENT_TRIGGER_PAUSE_MS")? {
            config.trigger_pause_ms = v;
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
