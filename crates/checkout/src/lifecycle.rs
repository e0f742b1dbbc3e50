//! Order creation and status transitions.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{
    DomainError, Order, OrderLine, OrderStatus, OrderStatusLogEntry, cart, pricing,
};
use store::{CommerceStore, StoreError};

use crate::error::CheckoutError;

/// How many fresh tokens to try when an order number collides.
const NUMBER_RETRIES: u32 = 3;

/// Creates orders from carts and drives the order status state machine.
///
/// Transition legality is decided here against the freshly loaded order;
/// the store re-checks the expected status under its lock, so a transition
/// that raced with another writer is re-evaluated rather than applied
/// blindly.
pub struct OrderLifecycle<S> {
    store: S,
}

impl<S: CommerceStore> OrderLifecycle<S> {
    /// Creates a new lifecycle service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a `PENDING` order by snapshotting the user's active cart.
    ///
    /// Quantities are validated against current stock here as a courtesy;
    /// the authoritative check happens again at payment confirmation.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let lines = self.store.active_lines_for_user(user_id).await?;
        if lines.is_empty() {
            return Err(DomainError::validation("lines", "cart is empty").into());
        }

        let product_ids: Vec<_> = lines.iter().map(|l| l.product_id).collect();
        let promotions = self.store.promotions_for_products(&product_ids).await?;

        let mut order_lines = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
            cart::validate_quantity(line.quantity, &product)?;

            order_lines.push(OrderLine {
                line_id: line.id,
                product_id: product.id,
                title: product.title.clone(),
                quantity: line.quantity,
                base_unit_price: product.price,
                unit_price: pricing::effective_unit_price(&product, &promotions, now),
            });
        }

        let coupon_id = lines.iter().find_map(|l| l.coupon_id);
        let mut order = Order::new(user_id, order_lines, coupon_id, now)?;

        for _ in 0..NUMBER_RETRIES {
            match self.store.insert_order(order.clone()).await {
                Ok(()) => {
                    metrics::counter!("orders_created_total").increment(1);
                    tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");
                    return Ok(order);
                }
                Err(StoreError::DuplicateOrderNumber) => {
                    tracing::warn!(order_id = %order.id, "order number collision, regenerating");
                    order.regenerate_number();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::DuplicateOrderNumber.into())
    }

    /// Transitions an order to `new_status`, recording the audit entry.
    ///
    /// Fails with `InvalidTransition` when the move is not in the legal
    /// table for the order's current status, including same-state requests.
    #[tracing::instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        let mut expected = order.status;
        loop {
            if !expected.can_transition(new_status) {
                return Err(DomainError::InvalidTransition {
                    from: expected,
                    to: new_status,
                }
                .into());
            }

            match self
                .store
                .apply_transition(order_id, expected, new_status, actor, now)
                .await
            {
                Ok(updated) => {
                    metrics::counter!(
                        "order_transitions_total",
                        "to" => new_status.as_str()
                    )
                    .increment(1);
                    tracing::info!(
                        %order_id,
                        from = %expected,
                        to = %new_status,
                        "order status changed"
                    );
                    return Ok(updated);
                }
                // Someone else moved the order first; re-evaluate from the
                // status they left behind.
                Err(StoreError::StatusConflict { actual, .. }) => expected = actual,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Cancels an order. Stock is not restored, whatever the prior status.
    pub async fn cancel(
        &self,
        order_id: OrderId,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        self.transition(order_id, OrderStatus::Cancelled, actor, now)
            .await
    }

    /// Moves a paid order into processing.
    pub async fn process(
        &self,
        order_id: OrderId,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        self.transition(order_id, OrderStatus::Processing, actor, now)
            .await
    }

    /// Marks a processing order as shipped.
    pub async fn ship(
        &self,
        order_id: OrderId,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        self.transition(order_id, OrderStatus::Shipped, actor, now)
            .await
    }

    /// Marks a shipped order as delivered.
    pub async fn deliver(
        &self,
        order_id: OrderId,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        self.transition(order_id, OrderStatus::Delivered, actor, now)
            .await
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, CheckoutError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// The user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, CheckoutError> {
        Ok(self.store.orders_for_user(user_id).await?)
    }

    /// Audit trail for an order, newest first.
    pub async fn status_logs(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderStatusLogEntry>, CheckoutError> {
        Ok(self.store.status_logs_for_order(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CartLine, Money, Product};
    use store::InMemoryStore;

    async fn seed_cart(store: &InMemoryStore, user: UserId, stock: u32, quantity: u32) -> Product {
        let product = Product::new("Widget", Money::from_units(1000), stock, Utc::now()).unwrap();
        store.insert_product(product.clone()).await.unwrap();
        let line = CartLine::new(user, &product, quantity, Utc::now()).unwrap();
        store.insert_cart_line(line).await.unwrap();
        product
    }

    #[tokio::test]
    async fn create_order_snapshots_cart() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let product = seed_cart(&store, user, 5, 2).await;

        let lifecycle = OrderLifecycle::new(store.clone());
        let order = lifecycle.create_order(user, Utc::now()).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].product_id, product.id);
        assert_eq!(order.lines[0].unit_price, Money::from_units(1000));
        assert_eq!(order.order_number.len(), 32);

        // Persisted, and the cart itself is untouched until payment.
        assert!(store.get_order(order.id).await.unwrap().is_some());
        assert_eq!(store.active_lines_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_order_rejects_empty_cart() {
        let store = InMemoryStore::new();
        let lifecycle = OrderLifecycle::new(store);
        let err = lifecycle
            .create_order(UserId::new(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Domain(DomainError::Validation { field: "lines", .. })
        ));
    }

    #[tokio::test]
    async fn create_order_rejects_quantity_over_stock() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        // Line was valid when added; stock has since dropped.
        let product = seed_cart(&store, user, 5, 4).await;
        let mut depleted = product.clone();
        depleted.stock = 1;
        store.insert_product(depleted).await.unwrap();

        let lifecycle = OrderLifecycle::new(store);
        let err = lifecycle.create_order(user, Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Domain(DomainError::InsufficientStock { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_pending_order_then_cancel_again_fails() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        seed_cart(&store, user, 5, 1).await;

        let lifecycle = OrderLifecycle::new(store.clone());
        let order = lifecycle.create_order(user, Utc::now()).await.unwrap();

        let cancelled = lifecycle
            .cancel(order.id, Some(user), Utc::now())
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let logs = lifecycle.status_logs(order.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            (logs[0].old_status, logs[0].new_status),
            (OrderStatus::Pending, OrderStatus::Cancelled)
        );

        let err = lifecycle
            .cancel(order.id, Some(user), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Domain(DomainError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Cancelled,
            })
        ));
        // The rejected attempt left no audit entry.
        assert_eq!(lifecycle.status_logs(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transition_rejects_skipping_states() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        seed_cart(&store, user, 5, 1).await;

        let lifecycle = OrderLifecycle::new(store);
        let order = lifecycle.create_order(user, Utc::now()).await.unwrap();

        let err = lifecycle
            .ship(order.id, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Domain(DomainError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped,
            })
        ));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let store = InMemoryStore::new();
        let lifecycle = OrderLifecycle::new(store);
        let err = lifecycle
            .cancel(OrderId::new(), None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn product_promotion_is_frozen_into_the_snapshot() {
        use domain::{NewPromotion, Promotion, PromotionKind};

        let store = InMemoryStore::new();
        let user = UserId::new();
        let product = seed_cart(&store, user, 5, 1).await;

        let now = Utc::now();
        let promo = Promotion::new(
            NewPromotion {
                title: "20 off".to_string(),
                kind: PromotionKind::Product,
                discount_percent: 20,
                code: None,
                product_ids: vec![product.id],
                starts_at: now - chrono::Duration::hours(1),
                ends_at: now + chrono::Duration::days(1),
                max_uses: None,
            },
            now,
        )
        .unwrap();
        store.insert_promotion(promo).await.unwrap();

        let lifecycle = OrderLifecycle::new(store);
        let order = lifecycle.create_order(user, now).await.unwrap();

        assert_eq!(order.lines[0].base_unit_price, Money::from_units(1000));
        assert_eq!(order.lines[0].unit_price, Money::from_units(800));
    }
}
