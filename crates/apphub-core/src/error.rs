/// The error taxonomy shared by every subsystem crate.
///
/// Each subsystem defines its own richer error enum internally, but every
/// variant converts into one of these at the crate boundary so callers only
/// ever have to match on seven kinds.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn external_unavailable(message: impl Into<String>) -> Self {
        Self::ExternalUnavailable(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The taxonomy code exposed on `{error: {code, message}}` responses
    /// (spec §7). Kept here even though this crate renders no HTTP response
    /// itself, since every consumer needs the same stable code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ExternalUnavailable(_) => "EXTERNAL_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Configuration(_) => "CONFIGURATION",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Timeouts are retried under the same policy as an unavailable
    /// downstream (spec §7 "Propagation policy").
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalUnavailable(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(CoreError::validation("x").code(), "VALIDATION");
        assert_eq!(CoreError::not_found("x").code(), "NOT_FOUND");
        assert_eq!(CoreError::internal("x").code(), "INTERNAL");
    }

    #[test]
    fn retryable_classification() {
        assert!(CoreError::external_unavailable("x").is_retryable());
        assert!(CoreError::timeout("x").is_retryable());
        assert!(!CoreError::validation("x").is_retryable());
        assert!(!CoreError::configuration("x").is_retryable());
    }
}
