//! Matches incoming event envelopes against registered triggers and
//! launches (or defers, or fails) workflow runs on their behalf (spec
//! §4.D).

pub mod error;
pub mod memory;
pub mod predicate;
pub mod processor;
pub mod runkey;
pub mod template;

pub use error::TriggerError;
pub use memory::InMemoryTriggerRepository;
pub use processor::{TriggerProcessor, EVENT_TRIGGER_QUEUE};
