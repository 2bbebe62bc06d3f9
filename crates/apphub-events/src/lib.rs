//! Validation, ordering, and idempotent ingestion of event envelopes
//! (spec §4.B).

pub mod bus;
pub mod memory;

pub use bus::{EventBus, IngestOutcome};
pub use memory::InMemoryEventRepository;
