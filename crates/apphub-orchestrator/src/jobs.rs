use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// Outcome of a job handler invocation (spec §4.E "A successful handler
/// returns `{status: succeeded|failed, result?, errorMessage?}`"). `Pending`
/// is a legal outcome distinct from both terminal states (Open Question #1):
/// the step stays `running` and is re-polled next pass without consuming a
/// retry attempt.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded { result: Value },
    Failed { error_message: String, error_type: Option<String> },
    Pending,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, parameters: Value) -> JobOutcome;
}

/// A plain string-keyed handler map, generalizing the teacher's
/// `WorkflowRegistry` (which maps a workflow *type* to a factory producing a
/// compiled `Workflow` impl) into a map from job slug straight to a runtime
/// handler, since job steps are resolved by slug at run time rather than by
/// a Rust type (spec §4.E "resolve job definition by slug").
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<String, std::sync::Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, slug: impl Into<String>, handler: std::sync::Arc<dyn JobHandler>) {
        self.handlers.insert(slug.into(), handler);
    }

    pub fn get(&self, slug: &str) -> Option<std::sync::Arc<dyn JobHandler>> {
        self.handlers.get(slug).cloned()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.handlers.contains_key(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl JobHandler for Echo {
        async fn handle(&self, parameters: Value) -> JobOutcome {
            JobOutcome::Succeeded { result: parameters }
        }
    }

    #[tokio::test]
    async fn registered_handler_is_retrievable_and_runs() {
        let mut registry = JobRegistry::new();
        registry.register("echo", std::sync::Arc::new(Echo));
        assert!(registry.contains("echo"));
        let handler = registry.get("echo").unwrap();
        let outcome = handler.handle(serde_json::json!({"a": 1})).await;
        assert!(matches!(outcome, JobOutcome::Succeeded { .. }));
    }

    #[test]
    fn unknown_slug_is_none() {
        let registry = JobRegistry::new();
        assert!(registry.get("ghost").is_none());
    }
}
