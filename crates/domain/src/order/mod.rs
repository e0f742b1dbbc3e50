//! Orders: the checkout-time snapshot of a cart plus lifecycle status.

mod number;
mod status;

pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{LineId, OrderId, ProductId, PromotionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// Payment gateways the storefront accepts confirmations from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankType {
    Zarinpal,
    Idpay,
}

impl BankType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankType::Zarinpal => "ZARINPAL",
            BankType::Idpay => "IDPAY",
        }
    }

    pub fn parse(s: &str) -> Option<BankType> {
        match s {
            "ZARINPAL" => Some(BankType::Zarinpal),
            "IDPAY" => Some(BankType::Idpay),
            _ => None,
        }
    }
}

impl std::fmt::Display for BankType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of an order, copied from the cart at creation time.
///
/// Prices are frozen here so later catalog changes never alter a placed
/// order. `unit_price` already includes the product promotion that was in
/// effect at creation; `base_unit_price` keeps the undiscounted price for
/// display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The cart line this snapshot was taken from; deactivated at payment.
    pub line_id: LineId,
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub base_unit_price: Money,
    pub unit_price: Money,
}

impl OrderLine {
    /// Returns `unit_price × quantity`.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An order: an immutable snapshot of cart lines plus lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Unique 32-char random token; never sequential.
    pub order_number: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    /// Coupon promotion applied at checkout, if any.
    pub coupon_id: Option<PromotionId>,
    pub bank_type: Option<BankType>,
    pub tracking_code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a `Pending` order from snapshotted lines.
    pub fn new(
        user_id: UserId,
        lines: Vec<OrderLine>,
        coupon_id: Option<PromotionId>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("lines", "cart is empty"));
        }

        Ok(Self {
            id: OrderId::new(),
            user_id,
            order_number: number::generate(),
            status: OrderStatus::Pending,
            lines,
            coupon_id,
            bank_type: None,
            tracking_code: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Draws a fresh order number, used when the store reports a collision.
    pub fn regenerate_number(&mut self) {
        self.order_number = number::generate();
    }

    /// Sum of line subtotals, before any coupon.
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(OrderLine::subtotal).sum()
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One accepted status transition, recorded exactly once.
///
/// Entries are append-only; nothing in the system mutates or deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusLogEntry {
    pub order_id: OrderId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    /// None for system-triggered transitions such as gateway confirmations.
    pub actor: Option<UserId>,
    pub created_at: DateTime<Utc>,
}
