//! Domain error taxonomy.

use common::ProductId;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors produced by domain rules.
///
/// Every variant here maps to a client-caused failure (4xx at the API
/// edge); infrastructure failures are represented by the store layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Client input failed a field-level validation rule.
    #[error("Validation failed on {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The requested status change is not in the legal transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// No promotion exists for the given coupon code.
    #[error("Unknown coupon code")]
    PromotionNotFound,

    /// The promotion exists but its validity window or active flag rejects it.
    #[error("Coupon code has expired or is inactive")]
    PromotionExpired,

    /// The promotion's usage cap was reached.
    #[error("Coupon code has no remaining uses")]
    PromotionExhausted,

    /// A cart or order line asks for more units than the product has.
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },
}

impl DomainError {
    /// Shorthand for a field validation failure.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }
}
