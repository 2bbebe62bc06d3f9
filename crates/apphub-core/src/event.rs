use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An immutable event envelope (spec §3 "Event envelope").
///
/// Ordering is total within a `(source, correlation_id)` pair by
/// `occurred_at`, globally partial. An envelope is inserted at-most-once:
/// duplicates by `id` are silently dropped by the bus, not rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
    pub correlation_id: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// Fields a producer supplies; `id` and `ingested_at` are assigned by the
/// bus if absent (spec §4.B contract step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEventEnvelope {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
    pub correlation_id: Option<String>,
}

impl NewEventEnvelope {
    pub fn into_envelope(self, ingested_at: DateTime<Utc>) -> EventEnvelope {
        EventEnvelope {
            id: self.id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            event_type: self.event_type,
            source: self.source,
            occurred_at: self.occurred_at,
            payload: self.payload,
            correlation_id: self.correlation_id,
            ingested_at,
        }
    }
}

/// Filter + pagination parameters for `EventRepository::list` (spec §4.B
/// "Listing").
#[derive(Debug, Clone, Default)]
pub struct EventListQuery {
    pub cursor: Option<EventCursor>,
    pub limit: usize,
    pub json_path: Option<String>,
    pub correlation_id: Option<String>,
    pub event_type: Option<String>,
    pub source: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Opaque cursor encoding the `(occurred_at, id)` tiebreak tuple (spec
/// §4.B). Serialized as base64-of-JSON so the wire representation remains
/// an opaque string to callers while staying trivially decodable here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventCursor {
    pub occurred_at: DateTime<Utc>,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventCursorWire {
    occurred_at: DateTime<Utc>,
    id: String,
}

impl EventCursor {
    pub fn encode(&self) -> String {
        let wire = EventCursorWire {
            occurred_at: self.occurred_at,
            id: self.id.clone(),
        };
        let json = serde_json::to_vec(&wire).expect("cursor always serializes");
        base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, json)
    }

    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes =
            base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, encoded)
                .ok()?;
        let wire: EventCursorWire = serde_json::from_slice(&bytes).ok()?;
        Some(Self {
            occurred_at: wire.occurred_at,
            id: wire.id,
        })
    }

    pub fn from_envelope(envelope: &EventEnvelope) -> Self {
        Self {
            occurred_at: envelope.occurred_at,
            id: envelope.id.clone(),
        }
    }
}

/// A page of events plus an optional cursor for the next page (spec §7
/// "List endpoints return `{data: [...], nextCursor?}`").
#[derive(Debug, Clone)]
pub struct EventPage {
    pub data: Vec<EventEnvelope>,
    pub next_cursor: Option<String>,
}
