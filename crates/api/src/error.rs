//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Caller lacks the staff flag required by the endpoint.
    Forbidden(String),
    /// Checkout service error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, field) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        let body = match field {
            Some(field) => serde_json::json!({ "error": message, "field": field }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String, Option<&'static str>) {
    match &err {
        CheckoutError::Domain(domain_err) => match domain_err {
            DomainError::Validation { field, .. } => {
                (StatusCode::BAD_REQUEST, err.to_string(), Some(field))
            }
            DomainError::InvalidTransition { .. }
            | DomainError::PromotionExpired => (StatusCode::BAD_REQUEST, err.to_string(), None),
            DomainError::PromotionNotFound => (StatusCode::NOT_FOUND, err.to_string(), None),
            // Races lost to other buyers; the client should refresh and
            // retry deliberately, not automatically.
            DomainError::PromotionExhausted | DomainError::InsufficientStock { .. } => {
                (StatusCode::CONFLICT, err.to_string(), None)
            }
        },
        CheckoutError::OrderNotFound(_)
        | CheckoutError::ProductNotFound(_)
        | CheckoutError::LineNotFound(_) => (StatusCode::NOT_FOUND, err.to_string(), None),
        CheckoutError::PaymentDeclined(_) => (StatusCode::BAD_REQUEST, err.to_string(), None),
        CheckoutError::Store(store_err) => match store_err {
            StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string(), None),
            StoreError::StatusConflict { .. } => (StatusCode::CONFLICT, err.to_string(), None),
            _ => {
                tracing::error!(error = %err, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        },
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Checkout(CheckoutError::Domain(err))
    }
}
