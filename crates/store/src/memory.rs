use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{LineId, OrderId, ProductId, PromotionId, UserId};
use domain::{
    CartLine, DomainError, Order, OrderStatus, OrderStatusLogEntry, Product, Promotion,
    PromotionKind,
};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::{CheckoutPlan, CommerceStore, PromotionFilter};

#[derive(Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    promotions: HashMap<PromotionId, Promotion>,
    cart_lines: HashMap<LineId, CartLine>,
    orders: HashMap<OrderId, Order>,
    status_logs: Vec<OrderStatusLogEntry>,
}

/// In-memory store implementation.
///
/// All tables live behind a single `RwLock`; the two transactional units
/// hold the write guard across validate-and-apply, which makes them
/// serializable without any further coordination. Used in tests and as
/// the default backend when no `DATABASE_URL` is configured.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of audit entries stored.
    pub async fn status_log_count(&self) -> usize {
        self.tables.read().await.status_logs.len()
    }

    /// Clears every table.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        *tables = Tables::default();
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.products.insert(product.id, product);
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn insert_promotion(&self, promotion: Promotion) -> Result<()> {
        let mut tables = self.tables.write().await;

        if let Some(ref code) = promotion.code
            && tables
                .promotions
                .values()
                .any(|p| p.code.as_deref() == Some(code))
        {
            return Err(StoreError::DuplicateCode);
        }

        tables.promotions.insert(promotion.id, promotion);
        Ok(())
    }

    async fn get_promotion(&self, id: PromotionId) -> Result<Option<Promotion>> {
        Ok(self.tables.read().await.promotions.get(&id).cloned())
    }

    async fn find_coupon(&self, code: &str) -> Result<Option<Promotion>> {
        let tables = self.tables.read().await;
        Ok(tables
            .promotions
            .values()
            .find(|p| p.kind == PromotionKind::Coupon && p.code.as_deref() == Some(code))
            .cloned())
    }

    async fn list_promotions(&self, filter: PromotionFilter) -> Result<Vec<Promotion>> {
        let tables = self.tables.read().await;
        let mut promotions: Vec<Promotion> = tables
            .promotions
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        promotions.sort_by(|a, b| b.starts_at.cmp(&a.starts_at));
        Ok(promotions)
    }

    async fn promotions_for_products(&self, product_ids: &[ProductId]) -> Result<Vec<Promotion>> {
        let tables = self.tables.read().await;
        Ok(tables
            .promotions
            .values()
            .filter(|p| {
                p.kind == PromotionKind::Product
                    && product_ids.iter().any(|id| p.product_ids.contains(id))
            })
            .cloned()
            .collect())
    }

    async fn insert_cart_line(&self, line: CartLine) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.cart_lines.insert(line.id, line);
        Ok(())
    }

    async fn get_cart_line(&self, id: LineId) -> Result<Option<CartLine>> {
        Ok(self.tables.read().await.cart_lines.get(&id).cloned())
    }

    async fn active_lines_for_user(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let tables = self.tables.read().await;
        let mut lines: Vec<CartLine> = tables
            .cart_lines
            .values()
            .filter(|l| l.user_id == user_id && l.is_active)
            .cloned()
            .collect();
        lines.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lines)
    }

    async fn deactivate_cart_line(&self, id: LineId, now: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let line = tables
            .cart_lines
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("cart line", id))?;
        line.is_active = false;
        line.updated_at = now;
        Ok(())
    }

    async fn set_cart_coupon(
        &self,
        user_id: UserId,
        coupon_id: Option<PromotionId>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut touched = 0;
        for line in tables.cart_lines.values_mut() {
            if line.user_id == user_id && line.is_active {
                line.coupon_id = coupon_id;
                line.updated_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::DuplicateOrderNumber);
        }

        tables.orders.insert(order.id, order);
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn apply_transition(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tables = self.tables.write().await;

        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;

        if order.status != expected {
            return Err(StoreError::StatusConflict {
                order_id,
                expected,
                actual: order.status,
            });
        }

        order.status = new_status;
        order.updated_at = now;
        let updated = order.clone();

        tables.status_logs.push(OrderStatusLogEntry {
            order_id,
            old_status: expected,
            new_status,
            actor,
            created_at: now,
        });

        Ok(updated)
    }

    async fn apply_checkout(&self, plan: CheckoutPlan) -> Result<Order> {
        let mut tables = self.tables.write().await;

        let order = tables
            .orders
            .get(&plan.order_id)
            .ok_or_else(|| StoreError::not_found("order", plan.order_id))?
            .clone();

        if order.status != OrderStatus::Pending {
            return Err(StoreError::StatusConflict {
                order_id: plan.order_id,
                expected: OrderStatus::Pending,
                actual: order.status,
            });
        }

        // Validate everything before mutating anything; the write guard is
        // held throughout, so these checks are authoritative. Quantities
        // are summed per product in case an order carries the same product
        // on more than one line.
        let mut quantities: Vec<(ProductId, u32)> = Vec::new();
        for line in &order.lines {
            match quantities.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, quantity)) => *quantity += line.quantity,
                None => quantities.push((line.product_id, line.quantity)),
            }
        }

        for (product_id, quantity) in &quantities {
            let product = tables
                .products
                .get(product_id)
                .ok_or_else(|| StoreError::not_found("product", *product_id))?;
            if !product.has_stock(*quantity) {
                return Err(DomainError::InsufficientStock {
                    product_id: *product_id,
                }
                .into());
            }
        }

        if let Some(coupon_id) = order.coupon_id {
            let promotion = tables
                .promotions
                .get(&coupon_id)
                .ok_or_else(|| StoreError::not_found("promotion", coupon_id))?;
            if !promotion.has_remaining_uses() {
                return Err(DomainError::PromotionExhausted.into());
            }
        }

        // All checks passed; apply the whole unit.
        for (product_id, quantity) in &quantities {
            let product = tables
                .products
                .get_mut(product_id)
                .expect("validated above");
            product
                .take_stock(*quantity, plan.now)
                .expect("validated above");
        }

        for line in &order.lines {
            if let Some(cart_line) = tables.cart_lines.get_mut(&line.line_id) {
                cart_line.is_active = false;
                cart_line.updated_at = plan.now;
            }
        }

        if let Some(coupon_id) = order.coupon_id {
            let promotion = tables
                .promotions
                .get_mut(&coupon_id)
                .expect("validated above");
            promotion.used_count += 1;
        }

        let order = tables.orders.get_mut(&plan.order_id).expect("loaded above");
        order.status = OrderStatus::Paid;
        order.bank_type = Some(plan.bank_type);
        order.tracking_code = Some(plan.tracking_code);
        order.updated_at = plan.now;
        let updated = order.clone();

        tables.status_logs.push(OrderStatusLogEntry {
            order_id: plan.order_id,
            old_status: OrderStatus::Pending,
            new_status: OrderStatus::Paid,
            actor: None,
            created_at: plan.now,
        });

        Ok(updated)
    }

    async fn status_logs_for_order(&self, order_id: OrderId) -> Result<Vec<OrderStatusLogEntry>> {
        let tables = self.tables.read().await;
        let mut logs: Vec<OrderStatusLogEntry> = tables
            .status_logs
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect();
        logs.reverse();
        Ok(logs)
    }
}
