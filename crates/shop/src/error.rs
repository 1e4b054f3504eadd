//! Unified error handling for the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::payment::PaymentError;
use crate::services::EngineError;

/// Application-level error type for HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// A fulfilment operation failed.
    #[error("{0}")]
    Engine(EngineError),

    /// A payment provider call was rejected.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound => Self::NotFound("no such purchase".to_string()),
            EngineError::Repository(e) => Self::Database(e),
            other => Self::Engine(other),
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Engine(e) => match e {
                EngineError::Order(_)
                | EngineError::Notify(_)
                | EngineError::UnknownVariant(_) => StatusCode::BAD_REQUEST,
                EngineError::CountryLocked(_) | EngineError::Transition { .. } => {
                    StatusCode::CONFLICT
                }
                EngineError::NotFound => StatusCode::NOT_FOUND,
                EngineError::Repository(_)
                | EngineError::Inconsistency { .. }
                | EngineError::OutOfIds => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Payment(e) => match e {
                PaymentError::MissingSignature | PaymentError::InvalidSignature => {
                    StatusCode::UNAUTHORIZED
                }
                PaymentError::NoWebhook(_) => StatusCode::NOT_FOUND,
                PaymentError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            match &self {
                Self::NotFound(what) => what.clone(),
                _ => self.to_string(),
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use voucher_store_core::{OrderError, PurchaseId};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");

        let err = AppError::from(EngineError::NotFound);
        assert_eq!(err.to_string(), "Not found: no such purchase");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(EngineError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(EngineError::Order(OrderError::Empty).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(EngineError::CountryLocked(PurchaseId::new("ABC234")).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(EngineError::OutOfIds.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(PaymentError::InvalidSignature.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
