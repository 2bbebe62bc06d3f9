use std::cmp::Reverse;

use apphub_core::error::Result;
use apphub_core::event::{EventCursor, EventEnvelope, EventListQuery, EventPage};
use apphub_core::repository::EventRepository;
use async_trait::async_trait;
use parking_lot::RwLock;

/// In-memory event log, mirroring
/// `durable::persistence::InMemoryWorkflowEventStore`'s
/// `parking_lot::RwLock`-guarded map style. Used by tests and by
/// `apphub-runtime` when no external store is configured.
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<Vec<EventEnvelope>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/inline-mode helper mirroring the teacher's `clear()` helpers.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn insert(&self, envelope: EventEnvelope) -> Result<bool> {
        let mut events = self.events.write();
        if events.iter().any(|e| e.id == envelope.id) {
            return Ok(false);
        }
        events.push(envelope);
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<EventEnvelope>> {
        Ok(self.events.read().iter().find(|e| e.id == id).cloned())
    }

    async fn list(&self, query: EventListQuery) -> Result<EventPage> {
        let events = self.events.read();
        let mut matching: Vec<&EventEnvelope> = events
            .iter()
            .filter(|e| {
                query
                    .event_type
                    .as_deref()
                    .map(|t| e.event_type == t)
                    .unwrap_or(true)
            })
            .filter(|e| query.source.as_deref().map(|s| e.source == s).unwrap_or(true))
            .filter(|e| {
                query
                    .correlation_id
                    .as_deref()
                    .map(|c| e.correlation_id.as_deref() == Some(c))
                    .unwrap_or(true)
            })
            .filter(|e| query.from.map(|from| e.occurred_at >= from).unwrap_or(true))
            .filter(|e| query.to.map(|to| e.occurred_at <= to).unwrap_or(true))
            .collect();

        // Strictly by occurred_at desc, id desc as tiebreak (spec §4.B
        // "Listing").
        matching.sort_by_key(|e| (Reverse(e.occurred_at), Reverse(e.id.clone())));

        if let Some(cursor) = &query.cursor {
            matching.retain(|e| (e.occurred_at, e.id.clone()) < (cursor.occurred_at, cursor.id.clone()));
        }

        let limit = if query.limit == 0 { 100 } else { query.limit };
        let page: Vec<EventEnvelope> = matching.into_iter().take(limit).cloned().collect();
        let next_cursor = if page.len() == limit {
            page.last().map(|e| EventCursor::from_envelope(e).encode())
        } else {
            None
        };

        Ok(EventPage {
            data: page,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn envelope(id: &str, occurred_at: chrono::DateTime<Utc>) -> EventEnvelope {
        EventEnvelope {
            id: id.to_string(),
            event_type: "metastore.record.updated".to_string(),
            source: "metastore.worker".to_string(),
            occurred_at,
            payload: json!({}),
            correlation_id: None,
            ingested_at: occurred_at,
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_by_id() {
        let repo = InMemoryEventRepository::new();
        let e = envelope("a", Utc::now());
        assert!(repo.insert(e.clone()).await.unwrap());
        assert!(!repo.insert(e).await.unwrap());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn list_orders_by_occurred_at_desc() {
        let repo = InMemoryEventRepository::new();
        let now = Utc::now();
        repo.insert(envelope("older", now - Duration::seconds(10)))
            .await
            .unwrap();
        repo.insert(envelope("newer", now)).await.unwrap();

        let page = repo
            .list(EventListQuery {
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data[0].id, "newer");
        assert_eq!(page.data[1].id, "older");
    }

    #[tokio::test]
    async fn cursor_excludes_already_seen_rows() {
        let repo = InMemoryEventRepository::new();
        let now = Utc::now();
        repo.insert(envelope("a", now - Duration::seconds(20)))
            .await
            .unwrap();
        repo.insert(envelope("b", now - Duration::seconds(10)))
            .await
            .unwrap();
        repo.insert(envelope("c", now)).await.unwrap();

        let first_page = repo
            .list(EventListQuery {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first_page.data[0].id, "c");
        let cursor = EventCursor::decode(first_page.next_cursor.as_ref().unwrap()).unwrap();

        let second_page = repo
            .list(EventListQuery {
                limit: 10,
                cursor: Some(cursor),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second_page.data.len(), 2);
        assert_eq!(second_page.data[0].id, "b");
    }
}
