use apphub_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("service '{0}' not found")]
    ServiceNotFound(String),
    #[error("no service slug is bound to repository id '{0}'")]
    UnknownRepository(String),
    #[error("openapi document is neither valid JSON nor YAML: {0}")]
    InvalidOpenapi(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ServiceNotFound(slug) => CoreError::not_found(format!("service: {slug}")),
            RegistryError::UnknownRepository(id) => {
                CoreError::not_found(format!("repository: {id}"))
            }
            RegistryError::InvalidOpenapi(message) => CoreError::validation(message),
            RegistryError::Core(e) => e,
        }
    }
}
