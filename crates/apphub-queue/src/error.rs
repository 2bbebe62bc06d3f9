use apphub_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' already registered")]
    DuplicateQueue(String),
    #[error("queue '{0}' not registered")]
    UnknownQueue(String),
    #[error("queue '{0}' has no handle in inline mode")]
    NoHandleInInlineMode(String),
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl From<QueueError> for CoreError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::DuplicateQueue(q) => CoreError::conflict(format!("duplicate queue: {q}")),
            QueueError::UnknownQueue(q) => CoreError::not_found(format!("unknown queue: {q}")),
            QueueError::NoHandleInInlineMode(q) => {
                CoreError::validation(format!("no handle for '{q}' in inline mode"))
            }
            QueueError::Transport(crate::transport::TransportError::Timeout(d)) => {
                CoreError::timeout(format!("transport timed out after {d:?}"))
            }
            QueueError::Transport(crate::transport::TransportError::Connection(msg)) => {
                CoreError::external_unavailable(msg)
            }
            QueueError::Config(e) => CoreError::configuration(e.to_string()),
        }
    }
}
