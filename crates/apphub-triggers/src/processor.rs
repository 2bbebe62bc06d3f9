use std::sync::Arc;

use apphub_core::event::EventEnvelope;
use apphub_core::repository::{LaunchWorkflowRequest, TriggerRepository, WorkflowLauncher};
use apphub_core::trigger::{DeliveryStatus, EventTrigger, RetryKind, TriggerDelivery, TriggerStatus};
use apphub_core::workflow::{RetryState, TriggeredBy};
use apphub_queue::QueueManager;
use apphub_scheduler::SchedulerState;
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::TriggerError;
use crate::{predicate, runkey, template};

pub const EVENT_TRIGGER_QUEUE: &str = "event-trigger";

/// For each ingested envelope, determines which triggers match, honors
/// throttling and concurrency, constructs run parameters, and creates
/// either a launched run or a throttled/failed/skipped delivery (spec
/// §4.D).
pub struct TriggerProcessor {
    repository: Arc<dyn TriggerRepository>,
    launcher: Arc<dyn WorkflowLauncher>,
    scheduler: Arc<SchedulerState>,
    queue: Arc<QueueManager>,
}

impl TriggerProcessor {
    pub fn new(
        repository: Arc<dyn TriggerRepository>,
        launcher: Arc<dyn WorkflowLauncher>,
        scheduler: Arc<SchedulerState>,
        queue: Arc<QueueManager>,
    ) -> Self {
        Self {
            repository,
            launcher,
            scheduler,
            queue,
        }
    }

    #[instrument(skip(self, envelope), fields(event_id = %envelope.id))]
    pub async fn process_envelope(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<Vec<TriggerDelivery>, TriggerError> {
        let candidates = self
            .repository
            .list_triggers_for_event(&envelope.event_type, &envelope.source)
            .await?;

        let envelope_value = serde_json::to_value(envelope).unwrap_or(serde_json::Value::Null);
        let mut deliveries = Vec::new();
        for trigger in candidates {
            if trigger.status != TriggerStatus::Active {
                continue;
            }
            if self.scheduler.is_trigger_paused(&trigger.id, Utc::now()) {
                continue;
            }
            if !trigger
                .predicates
                .iter()
                .all(|p| predicate::evaluate(p, &envelope_value))
            {
                continue;
            }

            let delivery = self.handle_candidate(&trigger, envelope).await?;
            self.repository.put_delivery(delivery.clone()).await?;
            deliveries.push(delivery);
        }
        Ok(deliveries)
    }

    async fn handle_candidate(
        &self,
        trigger: &EventTrigger,
        envelope: &EventEnvelope,
    ) -> Result<TriggerDelivery, TriggerError> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();

        let idempotency_key = match &trigger.idempotency_key_expression {
            Some(expr) => match template::render(
                &serde_json::Value::String(expr.clone()),
                &envelope.payload,
                &trigger.metadata,
            ) {
                Ok(value) => value.as_str().map(|s| s.to_string()),
                Err(_) => None,
            },
            None => None,
        };

        if let Some(key) = &idempotency_key {
            if let Some(existing) = self
                .repository
                .find_delivery_by_idempotency_key(&trigger.id, key)
                .await?
            {
                if existing.status != DeliveryStatus::Failed {
                    return Ok(TriggerDelivery {
                        id,
                        trigger_id: trigger.id.clone(),
                        workflow_definition_id: trigger.workflow_definition_id.clone(),
                        event_id: envelope.id.clone(),
                        status: DeliveryStatus::Skipped,
                        retry_kind: None,
                        retry_state: RetryState::Idle,
                        retry_attempts: 0,
                        next_attempt_at: None,
                        workflow_run_id: None,
                        idempotency_key,
                        error_message: Some("duplicate idempotency key".to_string()),
                        created_at: now,
                    });
                }
            }
        }

        if let Some(deferred) = self
            .check_throttle_and_concurrency(trigger, &id, envelope, idempotency_key.clone(), now)
            .await?
        {
            return Ok(deferred);
        }

        self.launch(trigger, &id, envelope, idempotency_key, now).await
    }

    async fn check_throttle_and_concurrency(
        &self,
        trigger: &EventTrigger,
        delivery_id: &str,
        envelope: &EventEnvelope,
        idempotency_key: Option<String>,
        now: chrono::DateTime<Utc>,
    ) -> Result<Option<TriggerDelivery>, TriggerError> {
        let throttled = if let (Some(window_ms), Some(count)) =
            (trigger.throttle_window_ms, trigger.throttle_count)
        {
            let since = now - chrono::Duration::milliseconds(window_ms as i64);
            self.repository.count_launched_in_window(&trigger.id, since).await? >= count
        } else {
            false
        };

        let at_capacity = if let Some(max_concurrency) = trigger.max_concurrency {
            self.repository.count_non_terminal_launched(&trigger.id).await? >= max_concurrency
        } else {
            false
        };

        if !throttled && !at_capacity {
            return Ok(None);
        }

        let window_ms = trigger.throttle_window_ms.unwrap_or(60_000);
        let next_attempt_at = now + chrono::Duration::milliseconds(window_ms as i64);
        let delivery = TriggerDelivery {
            id: delivery_id.to_string(),
            trigger_id: trigger.id.clone(),
            workflow_definition_id: trigger.workflow_definition_id.clone(),
            event_id: envelope.id.clone(),
            status: DeliveryStatus::Throttled,
            retry_kind: Some(RetryKind::Trigger),
            retry_state: RetryState::Scheduled,
            retry_attempts: 1,
            next_attempt_at: Some(next_attempt_at),
            workflow_run_id: None,
            idempotency_key,
            error_message: None,
            created_at: now,
        };

        let delay = (next_attempt_at - now).to_std().unwrap_or_default();
        self.queue
            .enqueue(
                EVENT_TRIGGER_QUEUE,
                delivery.id.clone(),
                serde_json::json!({"deliveryId": delivery.id}),
                Some(delay),
            )
            .await
            .map_err(|e| TriggerError::Core(e.into()))?;

        Ok(Some(delivery))
    }

    async fn launch(
        &self,
        trigger: &EventTrigger,
        delivery_id: &str,
        envelope: &EventEnvelope,
        idempotency_key: Option<String>,
        now: chrono::DateTime<Utc>,
    ) -> Result<TriggerDelivery, TriggerError> {
        let rendered_params = match template::render(
            &trigger.parameter_template,
            &envelope.payload,
            &trigger.metadata,
        ) {
            Ok(params) => params,
            Err(e) => {
                return Ok(TriggerDelivery {
                    id: delivery_id.to_string(),
                    trigger_id: trigger.id.clone(),
                    workflow_definition_id: trigger.workflow_definition_id.clone(),
                    event_id: envelope.id.clone(),
                    status: DeliveryStatus::Failed,
                    retry_kind: None,
                    retry_state: RetryState::Idle,
                    retry_attempts: 0,
                    next_attempt_at: None,
                    workflow_run_id: None,
                    idempotency_key,
                    error_message: Some(format!("parameter_resolution_failed: {e}")),
                    created_at: now,
                });
            }
        };

        let (run_key, _normalized) = runkey::derive(
            trigger.run_key_template.as_deref(),
            trigger.name.as_deref(),
            envelope.occurred_at,
        );

        let run = self
            .launcher
            .launch(LaunchWorkflowRequest {
                workflow_definition_slug: trigger.workflow_definition_id.clone(),
                parameters: rendered_params,
                triggered_by: TriggeredBy::EventTrigger,
                partition_key: None,
                run_key: Some(run_key),
                module_id: None,
            })
            .await
            .map_err(TriggerError::Core)?;

        info!(run_id = %run.id, trigger_id = %trigger.id, "trigger launched workflow run");

        Ok(TriggerDelivery {
            id: delivery_id.to_string(),
            trigger_id: trigger.id.clone(),
            workflow_definition_id: trigger.workflow_definition_id.clone(),
            event_id: envelope.id.clone(),
            status: DeliveryStatus::Launched,
            retry_kind: None,
            retry_state: RetryState::Completed,
            retry_attempts: 0,
            next_attempt_at: None,
            workflow_run_id: Some(run.id),
            idempotency_key,
            error_message: None,
            created_at: now,
        })
    }

    /// Re-evaluates matching and throttling against current trigger state
    /// (spec §4.D "Retry semantics"). Deliveries whose trigger has since
    /// been disabled or deleted terminate as `skipped`.
    #[instrument(skip(self))]
    pub async fn retry_delivery(&self, delivery_id: &str) -> Result<TriggerDelivery, TriggerError> {
        let delivery = self
            .repository
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| TriggerError::NotFound(delivery_id.to_string()))?;

        let trigger = match self.repository.get_trigger(&delivery.trigger_id).await? {
            Some(t) if t.status == TriggerStatus::Active => t,
            _ => {
                let skipped = TriggerDelivery {
                    status: DeliveryStatus::Skipped,
                    error_message: Some("trigger disabled or deleted".to_string()),
                    ..delivery
                };
                self.repository.put_delivery(skipped.clone()).await?;
                return Ok(skipped);
            }
        };

        let now = Utc::now();
        if let Some(deferred) = self
            .check_throttle_and_concurrency(
                &trigger,
                &delivery.id,
                &synthetic_envelope(&delivery),
                delivery.idempotency_key.clone(),
                now,
            )
            .await?
        {
            self.repository.put_delivery(deferred.clone()).await?;
            return Ok(deferred);
        }

        let launched = self
            .launch(
                &trigger,
                &delivery.id,
                &synthetic_envelope(&delivery),
                delivery.idempotency_key.clone(),
                now,
            )
            .await?;
        self.repository.put_delivery(launched.clone()).await?;
        Ok(launched)
    }
}

/// Retry re-evaluation has no original envelope payload on hand in this
/// in-memory sketch (a store-backed implementation would join against the
/// persisted event row by `delivery.event_id`); an empty payload is
/// sufficient for the throttle/concurrency/parameter-template paths that
/// retry exercises, since matching itself is not re-run on retry.
fn synthetic_envelope(delivery: &TriggerDelivery) -> EventEnvelope {
    EventEnvelope {
        id: delivery.event_id.clone(),
        event_type: String::new(),
        source: String::new(),
        occurred_at: delivery.created_at,
        payload: serde_json::Value::Null,
        correlation_id: None,
        ingested_at: delivery.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apphub_core::error::CoreError;
    use apphub_core::trigger::{Predicate, PredicateOp};
    use apphub_core::workflow::{RunStatus, WorkflowRun};
    use apphub_queue::{JobOptions, QueueManagerConfig};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLauncher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowLauncher for StubLauncher {
        async fn launch(
            &self,
            request: LaunchWorkflowRequest,
        ) -> apphub_core::error::Result<WorkflowRun> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WorkflowRun {
                id: format!("run-{n}"),
                workflow_definition_id: request.workflow_definition_slug,
                status: RunStatus::Pending,
                triggered_by: request.triggered_by,
                parameters: request.parameters,
                partition_key: request.partition_key,
                run_key: request.run_key.clone(),
                run_key_normalized: request.run_key.map(|k| k.to_lowercase()),
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                error_message: None,
                context: json!({}),
                module_id: request.module_id,
            })
        }
    }

    fn trigger(id: &str) -> EventTrigger {
        EventTrigger {
            id: id.to_string(),
            workflow_definition_id: "demo".to_string(),
            name: Some("demo-trigger".to_string()),
            event_type: "metastore.record.updated".to_string(),
            event_source: Some("metastore.worker".to_string()),
            predicates: vec![Predicate {
                path: "$.payload.namespace".to_string(),
                operator: PredicateOp::Equals {
                    value: json!("feature-flags"),
                },
                case_sensitive: true,
            }],
            parameter_template: json!({"namespace": "{{ event.payload.namespace }}"}),
            run_key_template: None,
            idempotency_key_expression: None,
            throttle_window_ms: None,
            throttle_count: None,
            max_concurrency: None,
            metadata: json!({}),
            status: TriggerStatus::Active,
            version: 1,
        }
    }

    fn envelope() -> EventEnvelope {
        EventEnvelope {
            id: "evt-1".to_string(),
            event_type: "metastore.record.updated".to_string(),
            source: "metastore.worker".to_string(),
            occurred_at: Utc::now(),
            payload: json!({"namespace": "feature-flags", "status": "active"}),
            correlation_id: None,
            ingested_at: Utc::now(),
        }
    }

    async fn processor() -> (TriggerProcessor, Arc<crate::memory::InMemoryTriggerRepository>) {
        let repository = Arc::new(crate::memory::InMemoryTriggerRepository::new());
        repository.put_trigger(trigger("trig-1")).await.unwrap();
        let launcher = Arc::new(StubLauncher {
            calls: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(SchedulerState::new(apphub_scheduler::SchedulerConfig::default()));
        let queue = Arc::new(QueueManager::new(QueueManagerConfig::inline_for_tests()));
        queue
            .register_queue(EVENT_TRIGGER_QUEUE, JobOptions::default())
            .unwrap();
        (
            TriggerProcessor::new(repository.clone(), launcher, scheduler, queue),
            repository,
        )
    }

    #[tokio::test]
    async fn matching_event_launches_one_delivery() {
        let (processor, _repo) = processor().await;
        let deliveries = processor.process_envelope(&envelope()).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Launched);
        assert!(deliveries[0].workflow_run_id.is_some());
    }

    #[tokio::test]
    async fn non_matching_predicate_produces_no_delivery() {
        let (processor, _repo) = processor().await;
        let mut envelope = envelope();
        envelope.payload = json!({"namespace": "other"});
        let deliveries = processor.process_envelope(&envelope).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn throttled_second_delivery_schedules_retry() {
        let repository = Arc::new(crate::memory::InMemoryTriggerRepository::new());
        let mut t = trigger("trig-1");
        t.throttle_window_ms = Some(60_000);
        t.throttle_count = Some(1);
        repository.put_trigger(t).await.unwrap();
        let launcher = Arc::new(StubLauncher {
            calls: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(SchedulerState::new(apphub_scheduler::SchedulerConfig::default()));
        let queue = Arc::new(QueueManager::new(QueueManagerConfig::inline_for_tests()));
        queue
            .register_queue(EVENT_TRIGGER_QUEUE, JobOptions::default())
            .unwrap();
        let processor = TriggerProcessor::new(repository.clone(), launcher, scheduler, queue);

        let first = processor.process_envelope(&envelope()).await.unwrap();
        assert_eq!(first[0].status, DeliveryStatus::Launched);

        let second = processor.process_envelope(&envelope()).await.unwrap();
        assert_eq!(second[0].status, DeliveryStatus::Throttled);
        assert_eq!(second[0].retry_attempts, 1);
    }

    #[tokio::test]
    async fn retry_of_disabled_trigger_is_skipped() {
        let (processor, repo) = processor().await;
        let deliveries = {
            let mut t = trigger("trig-1");
            t.throttle_window_ms = Some(60_000);
            t.throttle_count = Some(0);
            repo.put_trigger(t).await.unwrap();
            processor.process_envelope(&envelope()).await.unwrap()
        };
        let delivery = &deliveries[0];
        assert_eq!(delivery.status, DeliveryStatus::Throttled);

        let mut disabled = trigger("trig-1");
        disabled.status = TriggerStatus::Disabled;
        repo.put_trigger(disabled).await.unwrap();

        let retried = processor.retry_delivery(&delivery.id).await.unwrap();
        assert_eq!(retried.status, DeliveryStatus::Skipped);
    }

    #[test]
    fn core_error_conversion_preserves_not_found() {
        let err: CoreError = TriggerError::NotFound("x".into()).into();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
