use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Dependency '{dependency}' unavailable: {source}")]
    Dependency {
        dependency: String,
        source: anyhow::Error,
    },

    #[error("Transmission error: {0}")]
    Transmission(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Build a validation error naming the offending field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a dependency error for a named collaborator.
    pub fn dependency(dependency: impl Into<String>, source: anyhow::Error) -> Self {
        AppError::Dependency {
            dependency: dependency.into(),
            source,
        }
    }

    /// Infrastructure failures that a whole-batch retry may clear.
    ///
    /// Validation, not-found and configuration errors are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_)
                | AppError::ServiceUnavailable
                | AppError::Dependency { .. }
                | AppError::Transmission(_)
        )
    }

    /// Short label used for metrics and alert tags.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Dependency { .. } => "dependency",
            AppError::Transmission(_) => "transmission",
            AppError::InternalError(_) => "internal",
            AppError::ServiceUnavailable => "unavailable",
            AppError::DatabaseError(_) => "database",
            AppError::ConfigError(_) => "config",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_names_field() {
        let err = AppError::validation("month", "must be between 1 and 12");
        assert_eq!(
            err.to_string(),
            "Validation error on 'month': must be between 1 and 12"
        );
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::DatabaseError(anyhow::anyhow!("connection reset")).is_transient());
        assert!(AppError::ServiceUnavailable.is_transient());
        assert!(!AppError::validation("year", "missing").is_transient());
        assert!(!AppError::NotFound(anyhow::anyhow!("subject")).is_transient());
        assert!(!AppError::ConfigError(anyhow::anyhow!("bad key")).is_transient());
    }
}
