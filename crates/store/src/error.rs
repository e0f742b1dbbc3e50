//! Store error types.

use common::OrderId;
use domain::{DomainError, OrderStatus};
use thiserror::Error;

/// Convenience result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when interacting with the commerce store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An order's status did not match the expected precondition when a
    /// transactional unit re-checked it under the lock.
    #[error("Status conflict for order {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// Order number collided with an existing order.
    #[error("Order number already taken")]
    DuplicateOrderNumber,

    /// Coupon code collided with an existing promotion.
    #[error("Coupon code already taken")]
    DuplicateCode,

    /// A domain rule failed during in-lock re-validation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row failed to (de)serialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Shorthand for a [`StoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    ///
    /// Covers lock contention and serialization failures surfaced by the
    /// database; domain rejections and conflicts are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => {
                // 40001 serialization_failure, 40P01 deadlock_detected
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            StoreError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }
}
