//! The commerce store trait and its transactional plan types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{LineId, OrderId, ProductId, PromotionId, UserId};
use domain::{
    BankType, CartLine, Order, OrderStatus, OrderStatusLogEntry, Product, Promotion, PromotionKind,
};

use crate::error::Result;

/// Filters for the admin promotion listing.
#[derive(Debug, Clone, Default)]
pub struct PromotionFilter {
    pub is_active: Option<bool>,
    pub kind: Option<PromotionKind>,
    /// Keep promotions whose window starts at or after this instant.
    pub starts_after: Option<DateTime<Utc>>,
    /// Keep promotions whose window ends at or before this instant.
    pub ends_before: Option<DateTime<Utc>>,
}

impl PromotionFilter {
    /// Returns true if `promotion` passes every set filter.
    pub fn matches(&self, promotion: &Promotion) -> bool {
        if let Some(is_active) = self.is_active
            && promotion.is_active != is_active
        {
            return false;
        }
        if let Some(kind) = self.kind
            && promotion.kind != kind
        {
            return false;
        }
        if let Some(starts_after) = self.starts_after
            && promotion.starts_at < starts_after
        {
            return false;
        }
        if let Some(ends_before) = self.ends_before
            && promotion.ends_at > ends_before
        {
            return false;
        }
        true
    }
}

/// Input to [`CommerceStore::apply_checkout`].
///
/// Everything else the checkout needs (lines, quantities, the coupon) is
/// read from the stored order inside the transaction, so the plan can
/// never drift from what was actually persisted.
#[derive(Debug, Clone)]
pub struct CheckoutPlan {
    pub order_id: OrderId,
    pub bank_type: BankType,
    pub tracking_code: String,
    pub now: DateTime<Utc>,
}

/// Storage interface shared by every backend.
///
/// The two `apply_*` operations are the system's only write transactions.
/// Both re-validate their preconditions under the lock:
///
/// - `apply_transition` checks the order still carries the status the
///   caller validated against, then writes the new status and appends
///   exactly one audit entry.
/// - `apply_checkout` performs the whole payment unit: transition to
///   `PAID`, per-line stock verification and decrement (deactivating
///   products that hit zero), cart line deactivation, and coupon
///   redemption. All of it commits or none of it does.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    // -- catalog --

    async fn insert_product(&self, product: Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    // -- promotions --

    /// Inserts a promotion; fails with `DuplicateCode` when the coupon
    /// code is already taken.
    async fn insert_promotion(&self, promotion: Promotion) -> Result<()>;

    async fn get_promotion(&self, id: PromotionId) -> Result<Option<Promotion>>;

    /// Looks up a coupon-kind promotion by its code.
    async fn find_coupon(&self, code: &str) -> Result<Option<Promotion>>;

    /// Admin listing, newest window first.
    async fn list_promotions(&self, filter: PromotionFilter) -> Result<Vec<Promotion>>;

    /// All product-kind promotions covering any of `product_ids`.
    async fn promotions_for_products(&self, product_ids: &[ProductId]) -> Result<Vec<Promotion>>;

    // -- cart --

    async fn insert_cart_line(&self, line: CartLine) -> Result<()>;

    async fn get_cart_line(&self, id: LineId) -> Result<Option<CartLine>>;

    /// The user's active cart, newest line first.
    async fn active_lines_for_user(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Soft-deletes one cart line.
    async fn deactivate_cart_line(&self, id: LineId, now: DateTime<Utc>) -> Result<()>;

    /// Attaches (or clears) a coupon on every active line of the user's
    /// cart; returns the number of lines touched.
    async fn set_cart_coupon(
        &self,
        user_id: UserId,
        coupon_id: Option<PromotionId>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    // -- orders --

    /// Inserts an order; fails with `DuplicateOrderNumber` on a token
    /// collision so the caller can regenerate and retry.
    async fn insert_order(&self, order: Order) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// The user's orders, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    // -- transactional units --

    async fn apply_transition(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order>;

    async fn apply_checkout(&self, plan: CheckoutPlan) -> Result<Order>;

    // -- audit --

    /// Status log entries for an order, newest first.
    async fn status_logs_for_order(&self, order_id: OrderId) -> Result<Vec<OrderStatusLogEntry>>;
}
