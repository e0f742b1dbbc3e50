//! Cart lines.

use chrono::{DateTime, Utc};
use common::{LineId, ProductId, PromotionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::product::Product;

/// One product/quantity entry in a user's active cart.
///
/// Lines are soft-deleted: an inactive line is excluded from totals but
/// stays in the store until checkout clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Coupon promotion attached to the cart, if any.
    pub coupon_id: Option<PromotionId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Creates an active cart line after validating the quantity against
    /// the product's current stock.
    pub fn new(
        user_id: UserId,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_quantity(quantity, product)?;

        Ok(Self {
            id: LineId::new(),
            user_id,
            product_id: product.id,
            quantity,
            coupon_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Quantity must be at least 1 and must not exceed the product's stock at
/// validation time. The stock check here is advisory; checkout re-verifies
/// under the store lock.
pub fn validate_quantity(quantity: u32, product: &Product) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation(
            "quantity",
            "quantity must be at least 1",
        ));
    }
    if !product.is_active {
        return Err(DomainError::validation(
            "product_id",
            "product is not available",
        ));
    }
    if !product.has_stock(quantity) {
        return Err(DomainError::InsufficientStock {
            product_id: product.id,
        });
    }
    Ok(())
}
