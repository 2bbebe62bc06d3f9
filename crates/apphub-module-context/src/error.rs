use apphub_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleContextError {
    #[error("unknown module id '{0}'")]
    UnknownModule(String),
}

impl From<ModuleContextError> for CoreError {
    fn from(err: ModuleContextError) -> Self {
        match err {
            // An unknown moduleId surfaces as NotFound, not an empty list
            // (spec §4.G, §8 scenario 5), so stale module references are
            // distinguishable from modules that simply own nothing yet.
            ModuleContextError::UnknownModule(id) => CoreError::not_found(format!("module: {id}")),
        }
    }
}
