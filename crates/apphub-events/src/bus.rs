use std::sync::Arc;

use apphub_core::error::{CoreError, Result};
use apphub_core::event::{EventCursor, EventEnvelope, EventListQuery, EventPage, NewEventEnvelope};
use apphub_core::jsonpath;
use apphub_core::repository::EventRepository;
use chrono::Utc;
use tracing::instrument;

/// Validates, normalizes, and persists event envelopes (spec §4.B).
///
/// Downstream hand-off (scheduler rate evaluation, trigger dispatch) is the
/// caller's responsibility: `EventBus::ingest` only owns steps 1-3 of the
/// contract (validate, assign, insert); step 4 ("hand off ... if allowed,
/// dispatch") is orchestrated by `apphub-runtime`, which owns all four
/// subsystems and can sequence them without this crate depending on
/// `apphub-scheduler` or `apphub-triggers`.
pub struct EventBus {
    repository: Arc<dyn EventRepository>,
}

/// Outcome of `ingest`: whether the envelope was newly inserted (and
/// should continue to downstream rate limiting/triggers) or was a
/// duplicate (spec §4.B step 3: "return success without re-enqueueing").
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub envelope: EventEnvelope,
    pub newly_inserted: bool,
}

impl EventBus {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self { repository }
    }

    #[instrument(skip(self, new_envelope))]
    pub async fn ingest(&self, new_envelope: NewEventEnvelope) -> Result<IngestOutcome> {
        validate(&new_envelope)?;
        let envelope = new_envelope.into_envelope(Utc::now());
        let newly_inserted = self.repository.insert(envelope.clone()).await?;
        Ok(IngestOutcome {
            envelope,
            newly_inserted,
        })
    }

    #[instrument(skip(self, query))]
    pub async fn list(&self, query: EventListQuery) -> Result<EventPage> {
        let json_path = query.json_path.clone();
        let mut page = self.repository.list(query).await?;
        if let Some(path) = json_path {
            // Predicates are written against the envelope (e.g.
            // `$.payload.namespace`), matching the example in spec §8
            // scenario 1, so resolve against the serialized envelope
            // rather than just its payload field.
            page.data.retain(|envelope| {
                serde_json::to_value(envelope)
                    .ok()
                    .and_then(|value| jsonpath::resolve(&value, &path).cloned())
                    .map(|v| !v.is_null())
                    .unwrap_or(false)
            });
        }
        Ok(page)
    }
}

fn validate(new_envelope: &NewEventEnvelope) -> Result<()> {
    if new_envelope.event_type.trim().is_empty() {
        return Err(CoreError::validation("event type must not be empty"));
    }
    if new_envelope.source.trim().is_empty() {
        return Err(CoreError::validation("event source must not be empty"));
    }
    Ok(())
}

/// Encodes the next-page cursor from the last row of a page, or `None`
/// when fewer rows than the limit were returned (end of results).
pub fn next_cursor(page: &[EventEnvelope], limit: usize) -> Option<String> {
    if page.len() < limit {
        return None;
    }
    page.last().map(|e| EventCursor::from_envelope(e).encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEventRepository;
    use serde_json::json;

    fn new_event(event_type: &str, source: &str, payload: serde_json::Value) -> NewEventEnvelope {
        NewEventEnvelope {
            id: None,
            event_type: event_type.to_string(),
            source: source.to_string(),
            occurred_at: Utc::now(),
            payload,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn ingest_rejects_empty_type() {
        let bus = EventBus::new(Arc::new(InMemoryEventRepository::new()));
        let err = bus
            .ingest(new_event("", "src", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_id_is_reported_but_not_re_inserted() {
        let bus = EventBus::new(Arc::new(InMemoryEventRepository::new()));
        let mut event = new_event("metastore.record.updated", "metastore.worker", json!({}));
        event.id = Some("fixed-id".to_string());
        let first = bus.ingest(event.clone()).await.unwrap();
        assert!(first.newly_inserted);
        let second = bus.ingest(event).await.unwrap();
        assert!(!second.newly_inserted);
    }

    #[tokio::test]
    async fn list_filters_by_json_path() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let bus = EventBus::new(repository);
        bus.ingest(new_event(
            "metastore.record.updated",
            "metastore.worker",
            json!({"namespace": "feature-flags"}),
        ))
        .await
        .unwrap();
        bus.ingest(new_event(
            "metastore.record.updated",
            "metastore.worker",
            json!({"other": true}),
        ))
        .await
        .unwrap();

        let page = bus
            .list(EventListQuery {
                limit: 10,
                json_path: Some("$.payload.namespace".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
    }
}
