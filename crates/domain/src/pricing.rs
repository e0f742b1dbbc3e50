//! Pricing calculator.
//!
//! Pure functions over products, promotions, and line quantities. Safe to
//! call repeatedly for display purposes; nothing here touches usage
//! counters or any other state.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::Serialize;

use crate::money::Money;
use crate::product::Product;
use crate::promotion::{Promotion, PromotionKind};

/// A line reduced to the two numbers pricing needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    /// Unit price after any product promotion.
    pub unit_price: Money,
    pub quantity: u32,
}

impl PricedLine {
    pub fn new(unit_price: Money, quantity: u32) -> Self {
        Self {
            unit_price,
            quantity,
        }
    }

    /// Returns `unit_price × quantity`.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Cart-level totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CartTotals {
    /// Sum of line subtotals (product promotions already applied).
    pub subtotal: Money,
    /// Coupon discount taken off the summed subtotal.
    pub coupon_discount: Money,
    /// `max(0, subtotal − coupon_discount)`.
    pub final_total: Money,
    pub items_count: usize,
    pub total_quantity: u32,
}

/// Picks the product promotion to apply to `product_id`, if any.
///
/// Business rule: when several product promotions cover the same product,
/// the one with the highest discount percentage wins.
pub fn best_product_promotion<'a>(
    product_id: ProductId,
    promotions: &'a [Promotion],
    now: DateTime<Utc>,
) -> Option<&'a Promotion> {
    promotions
        .iter()
        .filter(|p| p.applies_to(product_id) && p.is_valid(now))
        .max_by_key(|p| p.discount_percent)
}

/// Returns the product's unit price with its best product promotion
/// applied, floored at zero.
pub fn effective_unit_price(
    product: &Product,
    promotions: &[Promotion],
    now: DateTime<Utc>,
) -> Money {
    match best_product_promotion(product.id, promotions, now) {
        Some(promotion) => product
            .price
            .saturating_sub(promotion.discount_amount(product.price)),
        None => product.price,
    }
}

/// Computes cart-level totals from priced lines and an optional coupon.
///
/// The coupon is a cart-level discount: its percentage is taken from the
/// summed subtotal, not per line, and only when the promotion is a valid
/// coupon at `now`.
pub fn cart_totals(
    lines: &[PricedLine],
    coupon: Option<&Promotion>,
    now: DateTime<Utc>,
) -> CartTotals {
    if lines.is_empty() {
        return CartTotals::default();
    }

    let subtotal: Money = lines.iter().map(PricedLine::subtotal).sum();

    let coupon_discount = match coupon {
        Some(p) if p.kind == PromotionKind::Coupon && p.is_valid(now) => p.discount_amount(subtotal),
        _ => Money::zero(),
    };

    CartTotals {
        subtotal,
        coupon_discount,
        final_total: subtotal.saturating_sub(coupon_discount),
        items_count: lines.len(),
        total_quantity: lines.iter().map(|l| l.quantity).sum(),
    }
}
