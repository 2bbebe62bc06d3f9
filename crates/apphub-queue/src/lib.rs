//! Dual-mode (distributed queue vs. in-process inline) work dispatcher
//! backing the orchestrator, trigger processor, and ingestion pipelines
//! (spec §4.A).

pub mod config;
pub mod error;
pub mod manager;
pub mod transport;

pub use config::{ConfigError, EventsMode, QueueManagerConfig};
pub use error::QueueError;
pub use manager::{JobOptions, QueueHandle, QueueManager};
pub use transport::{EnqueuedJob, InMemoryTransport, QueueCounts, QueueTransport, TransportError};
