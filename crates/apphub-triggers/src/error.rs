use apphub_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger '{0}' not found")]
    NotFound(String),
    #[error("parameter resolution failed: {0}")]
    ParameterResolutionFailed(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<TriggerError> for CoreError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::NotFound(t) => CoreError::not_found(format!("trigger: {t}")),
            TriggerError::ParameterResolutionFailed(msg) => CoreError::validation(msg),
            TriggerError::Core(e) => e,
        }
    }
}
