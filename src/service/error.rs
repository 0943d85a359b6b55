use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{db::ledger::StoreError, error::HttpError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{entity} {id} has already been processed")]
    AlreadyProcessed { entity: &'static str, id: Uuid },

    #[error("Insufficient funds for user {user_id}: required {required}, available {available}")]
    InsufficientFunds {
        user_id: Uuid,
        required: BigDecimal,
        available: BigDecimal,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    /// Errors the caller may retry as-is; the PENDING check makes a retry
    /// safe against double effects.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Timeout(_) | ServiceError::Conflict(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyProcessed { .. } | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => ServiceError::NotFound(format!("{} {}", entity, id)),
            StoreError::InsufficientFunds {
                user_id,
                available,
                requested,
            } => ServiceError::InsufficientFunds {
                user_id,
                required: requested,
                available,
            },
            StoreError::Duplicate(constraint) => {
                ServiceError::Validation(format!("duplicate value violates {}", constraint))
            }
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Timeout(msg) => ServiceError::Timeout(msg),
            StoreError::Database(err) => ServiceError::Storage(err.to_string()),
            StoreError::Unavailable(msg) => ServiceError::Storage(msg),
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        match error {
            // Do not leak driver details to clients.
            ServiceError::Storage(_) => HttpError::server_error("Internal storage error"),
            _ => HttpError::new(error.to_string(), status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_service_kinds() {
        let id = Uuid::new_v4();

        let err: ServiceError = StoreError::NotFound { entity: "submission", id }.into();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err: ServiceError = StoreError::Conflict("deadlock detected".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ServiceError = StoreError::Unavailable("down".into()).into();
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn already_processed_is_a_client_error() {
        let err = ServiceError::AlreadyProcessed {
            entity: "withdrawal",
            id: Uuid::nil(),
        };
        let http: HttpError = err.into();
        assert_eq!(http.status, StatusCode::CONFLICT);
        assert!(http.message.contains("already been processed"));
    }
}
