//! Shared data model, error taxonomy, and repository traits for the
//! application-hub control plane. Every other crate in this workspace
//! depends on this one; it owns no background tasks and performs no I/O.

pub mod error;
pub mod event;
pub mod jsonpath;
pub mod module_context;
pub mod repository;
pub mod service;
pub mod trigger;
pub mod workflow;

pub mod prelude {
    pub use crate::error::{CoreError, Result};
    pub use crate::event::{EventCursor, EventEnvelope, EventListQuery, EventPage, NewEventEnvelope};
    pub use crate::module_context::{ModuleResourceContext, ResourceType};
    pub use crate::repository::{
        EventRepository, LaunchWorkflowRequest, ServiceRepository, TriggerRepository,
        WorkflowLauncher, WorkflowRepository,
    };
    pub use crate::service::{ServiceManifestEntry, ServiceRecord, ServiceStatus};
    pub use crate::trigger::{DeliveryStatus, EventTrigger, RetryKind, TriggerDelivery};
    pub use crate::workflow::{
        RunStatus, StepKind, StepStatus, TriggeredBy, WorkflowDefinition, WorkflowRun,
        WorkflowRunStep, WorkflowStepDefinition,
    };
}
