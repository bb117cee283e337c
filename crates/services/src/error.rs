//! Service error types.

use domain::DomainError;
use domain::pricing::CodeRejection;
use store::StoreError;
use thiserror::Error;

/// Errors returned by order and delivery use-cases.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request broke a business rule.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The entity changed since the caller read it.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The acting user is unknown.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Persistence failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ServiceError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => ServiceError::Validation { field, message },
            DomainError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
        }
    }
}

impl From<CodeRejection> for ServiceError {
    fn from(err: CodeRejection) -> Self {
        DomainError::from(err).into()
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            other => ServiceError::Store(other),
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
