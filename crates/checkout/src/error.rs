//! Checkout-layer error type.

use common::{LineId, OrderId, ProductId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the checkout services.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Domain(DomainError),

    /// The referenced order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The referenced cart line does not exist (or belongs to someone else).
    #[error("Cart line not found: {0}")]
    LineNotFound(LineId),

    /// The gateway reported a failed payment; the order stays pending.
    #[error("Payment was declined for order {0}")]
    PaymentDeclined(OrderId),

    /// The store failed for non-domain reasons.
    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        CheckoutError::Domain(err)
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        // In-lock rule failures come back through the store; surface them
        // as the domain errors they are.
        match err {
            StoreError::Domain(domain) => CheckoutError::Domain(domain),
            other => CheckoutError::Store(other),
        }
    }
}
