use std::env;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventsMode {
    Redis,
    Inline,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APPHUB_EVENTS_MODE must be 'redis' or 'inline', got '{0}'")]
    InvalidMode(String),
    #[error(
        "APPHUB_EVENTS_MODE=inline requires APPHUB_ALLOW_INLINE_MODE to be set truthy; \
         inline mode is a test affordance, not a production mode"
    )]
    InlineModeNotAllowed,
}

/// Environment-driven configuration (spec §6 "Configuration",
/// `APPHUB_EVENTS_MODE`, `APPHUB_ALLOW_INLINE_MODE`), following the
/// teacher's `RunnerConfig::from_env` style: parse once at startup, never
/// panic on an absent optional variable.
#[derive(Debug, Clone)]
pub struct QueueManagerConfig {
    pub mode: EventsMode,
    pub allow_inline_mode: bool,
}

impl QueueManagerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let allow_inline_mode = truthy(env::var("APPHUB_ALLOW_INLINE_MODE").ok());
        let mode = match env::var("APPHUB_EVENTS_MODE").ok().as_deref() {
            None | Some("redis") => EventsMode::Redis,
            Some("inline") => EventsMode::Inline,
            Some(other) => return Err(ConfigError::InvalidMode(other.to_string())),
        };
        if mode == EventsMode::Inline && !allow_inline_mode {
            return Err(ConfigError::InlineModeNotAllowed);
        }
        Ok(Self {
            mode,
            allow_inline_mode,
        })
    }

    pub fn inline_for_tests() -> Self {
        Self {
            mode: EventsMode::Inline,
            allow_inline_mode: true,
        }
    }
}

fn truthy(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_lowercase).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_parses_common_forms() {
        assert!(truthy(Some("true".into())));
        assert!(truthy(Some("1".into())));
        assert!(truthy(Some("YES".into())));
        assert!(!truthy(Some("0".into())));
        assert!(!truthy(None));
    }
}
