use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::{RateLimitRule, SchedulerConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseReason {
    RateLimit,
    FailureThresholdExceeded,
}

#[derive(Debug, Clone)]
pub struct ActivePause {
    pub key: String,
    pub reason: PauseReason,
    pub paused_until: DateTime<Utc>,
}

struct SourceState {
    window: VecDeque<DateTime<Utc>>,
    pause: Option<DateTime<Utc>>,
}

struct TriggerState {
    failures: VecDeque<DateTime<Utc>>,
    pause: Option<DateTime<Utc>>,
}

/// Enforces per-source rate limits and auto-pauses misbehaving triggers
/// (spec §4.C). All state is in-memory and process-local by design
/// (spec §9 "Global mutable state": "restart-freshness is a feature").
/// Sliding windows follow the same atomic/lock-guarded style as the
/// teacher's `durable::worker::BackpressureState`.
pub struct SchedulerState {
    config: SchedulerConfig,
    sources: RwLock<HashMap<String, SourceState>>,
    triggers: RwLock<HashMap<String, TriggerState>>,
}

impl SchedulerState {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            sources: RwLock::new(HashMap::new()),
            triggers: RwLock::new(HashMap::new()),
        }
    }

    fn rule_for_source(&self, source: &str) -> Option<&RateLimitRule> {
        self.config
            .rate_limit_rules
            .iter()
            .find(|r| r.source == source)
            .or_else(|| self.config.rate_limit_rules.iter().find(|r| r.source == "*"))
    }

    /// Records an event for `source` at `now` and reports whether it is
    /// allowed (spec §4.C "Rate limiting"). Once a source reports
    /// `allowed=false`, subsequent calls within the pause window also
    /// report `false` without touching the window (spec §8 invariant).
    pub fn register_source_event(&self, source: &str, now: DateTime<Utc>) -> bool {
        let Some(rule) = self.rule_for_source(source).cloned() else {
            return true;
        };

        let mut sources = self.sources.write();
        let state = sources.entry(source.to_string()).or_insert_with(|| SourceState {
            window: VecDeque::new(),
            pause: None,
        });

        if let Some(paused_until) = state.pause {
            if now < paused_until {
                return false;
            }
            state.pause = None;
        }

        let cutoff = now - chrono::Duration::milliseconds(rule.interval_ms as i64);
        while let Some(front) = state.window.front() {
            if *front < cutoff {
                state.window.pop_front();
            } else {
                break;
            }
        }
        state.window.push_back(now);

        if state.window.len() > rule.limit {
            state.pause = Some(now + chrono::Duration::milliseconds(rule.pause_ms as i64));
            return false;
        }
        true
    }

    pub fn list_active_source_pauses(&self, now: DateTime<Utc>) -> Vec<ActivePause> {
        self.sources
            .read()
            .iter()
            .filter_map(|(key, state)| {
                state.pause.filter(|until| *until > now).map(|until| ActivePause {
                    key: key.clone(),
                    reason: PauseReason::RateLimit,
                    paused_until: until,
                })
            })
            .collect()
    }

    /// Appends a failure timestamp for `trigger_id`; pauses the trigger
    /// once the count in `errorWindowMs` reaches `errorThreshold` (spec
    /// §4.C "Trigger failure pausing"). Returns `true` if this call caused
    /// the trigger to become paused.
    pub fn record_trigger_failure(&self, trigger_id: &str, now: DateTime<Utc>) -> bool {
        let mut triggers = self.triggers.write();
        let state = triggers
            .entry(trigger_id.to_string())
            .or_insert_with(|| TriggerState {
                failures: VecDeque::new(),
                pause: None,
            });

        let cutoff = now - chrono::Duration::milliseconds(self.config.trigger_error_window_ms as i64);
        while let Some(front) = state.failures.front() {
            if *front < cutoff {
                state.failures.pop_front();
            } else {
                break;
            }
        }
        state.failures.push_back(now);

        if state.failures.len() as u32 >= self.config.trigger_error_threshold {
            state.pause = Some(now + chrono::Duration::milliseconds(self.config.trigger_pause_ms as i64));
            return true;
        }
        false
    }

    /// Success clears the failure window (spec §4.C).
    pub fn record_trigger_success(&self, trigger_id: &str) {
        if let Some(state) = self.triggers.write().get_mut(trigger_id) {
            state.failures.clear();
        }
    }

    pub fn is_trigger_paused(&self, trigger_id: &str, now: DateTime<Utc>) -> bool {
        self.triggers
            .read()
            .get(trigger_id)
            .and_then(|state| state.pause)
            .map(|until| now < until)
            .unwrap_or(false)
    }

    pub fn list_active_trigger_pauses(&self, now: DateTime<Utc>) -> Vec<ActivePause> {
        self.triggers
            .read()
            .iter()
            .filter_map(|(key, state)| {
                state.pause.filter(|until| *until > now).map(|until| ActivePause {
                    key: key.clone(),
                    reason: PauseReason::FailureThresholdExceeded,
                    paused_until: until,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_rule(limit: usize, interval_ms: u64, pause_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            rate_limit_rules: vec![RateLimitRule {
                source: "metastore.worker".to_string(),
                limit,
                interval_ms,
                pause_ms,
            }],
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn allows_events_under_the_limit() {
        let state = SchedulerState::new(config_with_rule(2, 1_000, 5_000));
        let now = Utc::now();
        assert!(state.register_source_event("metastore.worker", now));
        assert!(state.register_source_event("metastore.worker", now));
    }

    #[test]
    fn pauses_once_limit_exceeded_and_stays_paused() {
        let state = SchedulerState::new(config_with_rule(1, 1_000, 5_000));
        let now = Utc::now();
        assert!(state.register_source_event("metastore.worker", now));
        assert!(!state.register_source_event("metastore.worker", now));
        // spec §8: subsequent calls within the pause window also report false.
        assert!(!state.register_source_event(
            "metastore.worker",
            now + chrono::Duration::milliseconds(100)
        ));
    }

    #[test]
    fn pause_clears_after_pause_window_elapses() {
        let state = SchedulerState::new(config_with_rule(1, 1_000, 1_000));
        let now = Utc::now();
        assert!(state.register_source_event("metastore.worker", now));
        assert!(!state.register_source_event("metastore.worker", now));
        let later = now + chrono::Duration::milliseconds(1_500);
        assert!(state.register_source_event("metastore.worker", later));
    }

    #[test]
    fn unconfigured_source_is_always_allowed() {
        let state = SchedulerState::new(SchedulerConfig::default());
        let now = Utc::now();
        for _ in 0..1000 {
            assert!(state.register_source_event("unknown.source", now));
        }
    }

    #[test]
    fn trigger_pauses_at_error_threshold() {
        let config = SchedulerConfig {
            trigger_error_threshold: 3,
            trigger_error_window_ms: 300_000,
            trigger_pause_ms: 300_000,
            ..SchedulerConfig::default()
        };
        let state = SchedulerState::new(config);
        let now = Utc::now();
        assert!(!state.record_trigger_failure("trig-1", now));
        assert!(!state.record_trigger_failure("trig-1", now));
        assert!(state.record_trigger_failure("trig-1", now));
        assert!(state.is_trigger_paused("trig-1", now));
    }

    #[test]
    fn trigger_success_clears_failure_window() {
        let config = SchedulerConfig {
            trigger_error_threshold: 2,
            ..SchedulerConfig::default()
        };
        let state = SchedulerState::new(config);
        let now = Utc::now();
        assert!(!state.record_trigger_failure("trig-1", now));
        state.record_trigger_success("trig-1");
        assert!(!state.record_trigger_failure("trig-1", now));
    }
}
