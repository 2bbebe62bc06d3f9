use serde::{Deserialize, Serialize};

/// The kind of resource a module-resource-context binding names (spec
/// §4.G).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Workflow,
    Service,
    Job,
}

/// Binds `(moduleId, moduleVersion, resourceType, resourceId)` to the
/// module that published it (spec §4.G).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModuleResourceContext {
    pub module_id: String,
    pub module_version: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
}
