use apphub_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("workflow run '{0}' not found")]
    RunNotFound(String),
    #[error("workflow definition '{0}' not found")]
    DefinitionNotFound(String),
    #[error("job '{0}' not registered")]
    UnknownJob(String),
    #[error("an active non-terminal run already exists for run key '{0}'")]
    DuplicateRunKey(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<OrchestratorError> for CoreError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::RunNotFound(id) => CoreError::not_found(format!("run: {id}")),
            OrchestratorError::DefinitionNotFound(slug) => {
                CoreError::not_found(format!("workflow definition: {slug}"))
            }
            OrchestratorError::UnknownJob(slug) => {
                CoreError::validation(format!("unknown job slug: {slug}"))
            }
            OrchestratorError::DuplicateRunKey(key) => CoreError::conflict(format!(
                "non-terminal run already exists for run key '{key}'"
            )),
            OrchestratorError::Core(e) => e,
        }
    }
}
