//! Service manifest cache, health poller, OpenAPI hashing, and runtime
//! binding for the registry of third-party app services (spec §4.F).

pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod invalidation;
pub mod memory;
pub mod openapi;
pub mod registry;
pub mod runtime_binding;

pub use cache::{ManifestState, ManifestStateCache};
pub use config::RegistryConfig;
pub use error::RegistryError;
pub use invalidation::{InvalidationBus, InvalidationKind, InvalidationMessage};
pub use memory::InMemoryServiceRepository;
pub use registry::ServiceRegistry;
