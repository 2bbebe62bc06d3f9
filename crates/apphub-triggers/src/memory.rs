use std::collections::HashMap;

use apphub_core::error::Result;
use apphub_core::repository::TriggerRepository;
use apphub_core::trigger::{DeliveryStatus, EventTrigger, TriggerDelivery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// In-memory trigger + delivery store, mirroring
/// `durable::persistence::InMemoryWorkflowEventStore`'s map-of-maps style.
#[derive(Default)]
pub struct InMemoryTriggerRepository {
    triggers: RwLock<HashMap<String, EventTrigger>>,
    deliveries: RwLock<HashMap<String, TriggerDelivery>>,
}

impl InMemoryTriggerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.triggers.write().clear();
        self.deliveries.write().clear();
    }
}

#[async_trait]
impl TriggerRepository for InMemoryTriggerRepository {
    async fn get_trigger(&self, id: &str) -> Result<Option<EventTrigger>> {
        Ok(self.triggers.read().get(id).cloned())
    }

    async fn put_trigger(&self, trigger: EventTrigger) -> Result<()> {
        self.triggers.write().insert(trigger.id.clone(), trigger);
        Ok(())
    }

    async fn list_triggers_for_event(
        &self,
        event_type: &str,
        event_source: &str,
    ) -> Result<Vec<EventTrigger>> {
        Ok(self
            .triggers
            .read()
            .values()
            .filter(|t| t.event_type == event_type)
            .filter(|t| {
                t.event_source
                    .as_deref()
                    .map(|s| s == event_source)
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn get_delivery(&self, id: &str) -> Result<Option<TriggerDelivery>> {
        Ok(self.deliveries.read().get(id).cloned())
    }

    async fn put_delivery(&self, delivery: TriggerDelivery) -> Result<()> {
        self.deliveries.write().insert(delivery.id.clone(), delivery);
        Ok(())
    }

    async fn find_delivery_by_idempotency_key(
        &self,
        trigger_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<TriggerDelivery>> {
        Ok(self
            .deliveries
            .read()
            .values()
            .find(|d| {
                d.trigger_id == trigger_id
                    && d.idempotency_key.as_deref() == Some(idempotency_key)
                    && d.status != DeliveryStatus::Failed
            })
            .cloned())
    }

    async fn count_launched_in_window(
        &self,
        trigger_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        Ok(self
            .deliveries
            .read()
            .values()
            .filter(|d| {
                d.trigger_id == trigger_id
                    && d.status == DeliveryStatus::Launched
                    && d.created_at >= since
            })
            .count() as u32)
    }

    async fn count_non_terminal_launched(&self, trigger_id: &str) -> Result<u32> {
        // Approximated from delivery status alone: this in-memory store has
        // no view into run status, so it counts deliveries marked
        // `launched`. A store-backed implementation would join against
        // `workflow_runs.status`.
        Ok(self
            .deliveries
            .read()
            .values()
            .filter(|d| d.trigger_id == trigger_id && d.status == DeliveryStatus::Launched)
            .count() as u32)
    }
}
