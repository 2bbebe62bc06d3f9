use std::collections::{HashMap, HashSet};

use apphub_core::module_context::{ModuleResourceContext, ResourceType};
use parking_lot::RwLock;

use crate::error::ModuleContextError;

/// Keyed index over `(moduleId, moduleVersion, resourceType, resourceId)`
/// bindings (spec §4.G). Structurally mirrors the teacher's
/// `durable::persistence::memory` keyed in-memory map style: one map keyed
/// by the filter dimension callers actually query by (`moduleId`), one
/// reverse map for removal.
#[derive(Default)]
pub struct ModuleContextIndex {
    by_module: RwLock<HashMap<String, HashSet<ModuleResourceContext>>>,
    by_resource: RwLock<HashMap<(ResourceType, String), String>>,
}

impl ModuleContextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a resource to a module (spec §4.G: "a module-resource-context
    /// record is written"). Re-binding the same resource to a different
    /// module moves it; re-binding identically is a no-op.
    pub fn bind(&self, context: ModuleResourceContext) {
        let key = (context.resource_type, context.resource_id.clone());
        let previous_module = self
            .by_resource
            .write()
            .insert(key.clone(), context.module_id.clone());
        if let Some(previous_module) = previous_module {
            if previous_module != context.module_id {
                if let Some(set) = self.by_module.write().get_mut(&previous_module) {
                    set.retain(|c| !(c.resource_type == key.0 && c.resource_id == key.1));
                }
            }
        }
        self.by_module
            .write()
            .entry(context.module_id.clone())
            .or_default()
            .insert(context);
    }

    pub fn unbind(&self, resource_type: ResourceType, resource_id: &str) {
        let key = (resource_type, resource_id.to_string());
        if let Some(module_id) = self.by_resource.write().remove(&key) {
            if let Some(set) = self.by_module.write().get_mut(&module_id) {
                set.retain(|c| !(c.resource_type == resource_type && c.resource_id == resource_id));
            }
        }
    }

    /// True once `module_id` has been bound to at least one resource;
    /// distinguishes "unknown module" from "module with nothing published
    /// yet" for `list_for_module`/`filter` (spec §8 scenario 5).
    pub fn knows_module(&self, module_id: &str) -> bool {
        self.by_module.read().contains_key(module_id)
    }

    pub fn list_for_module(
        &self,
        module_id: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<String>, ModuleContextError> {
        let by_module = self.by_module.read();
        let set = by_module
            .get(module_id)
            .ok_or_else(|| ModuleContextError::UnknownModule(module_id.to_string()))?;
        Ok(set
            .iter()
            .filter(|c| c.resource_type == resource_type)
            .map(|c| c.resource_id.clone())
            .collect())
    }

    /// Restricts `resource_ids` to those bound to `module_id`. Returns
    /// `Err` for an unknown moduleId rather than an empty list (spec §4.G,
    /// §8 scenario 5: `GET /workflows?moduleId=unknown` is a 404, not
    /// `{data: []}`).
    pub fn filter(
        &self,
        module_id: &str,
        resource_type: ResourceType,
        resource_ids: &[String],
    ) -> Result<Vec<String>, ModuleContextError> {
        let allowed: HashSet<String> = self
            .list_for_module(module_id, resource_type)?
            .into_iter()
            .collect();
        Ok(resource_ids
            .iter()
            .filter(|id| allowed.contains(*id))
            .cloned()
            .collect())
    }
}
