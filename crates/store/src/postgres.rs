use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{LineId, OrderId, ProductId, PromotionId, UserId};
use domain::{
    BankType, CartLine, DomainError, Money, Order, OrderLine, OrderStatus, OrderStatusLogEntry,
    Product, Promotion, PromotionKind,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{CheckoutPlan, CommerceStore, PromotionFilter};

/// PostgreSQL-backed commerce store.
///
/// The transactional units run inside SQL transactions with
/// `SELECT ... FOR UPDATE` row locks acquired in a stable order (the
/// order row first, then product rows ascending by id, then the promotion
/// row) so concurrent confirmations cannot deadlock.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            title: row.try_get("title")?,
            price: Money::from_units(row.try_get("price")?),
            stock: row.try_get::<i64, _>("stock")? as u32,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_promotion(row: PgRow) -> Result<Promotion> {
        let kind: PromotionKind =
            serde_json::from_value(serde_json::Value::String(row.try_get("kind")?))?;
        let product_ids: Vec<ProductId> = serde_json::from_value(row.try_get("product_ids")?)?;

        Ok(Promotion {
            id: PromotionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            title: row.try_get("title")?,
            kind,
            discount_percent: row.try_get::<i16, _>("discount_percent")? as u8,
            code: row.try_get("code")?,
            product_ids,
            starts_at: row.try_get("starts_at")?,
            ends_at: row.try_get("ends_at")?,
            is_active: row.try_get("is_active")?,
            max_uses: row.try_get::<Option<i64>, _>("max_uses")?.map(|m| m as u32),
            used_count: row.try_get::<i64, _>("used_count")? as u32,
        })
    }

    fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
        Ok(CartLine {
            id: LineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: row.try_get::<i64, _>("quantity")? as u32,
            coupon_id: row
                .try_get::<Option<Uuid>, _>("coupon_id")?
                .map(PromotionId::from_uuid),
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: OrderStatus =
            serde_json::from_value(serde_json::Value::String(row.try_get("status")?))?;
        let lines: Vec<OrderLine> = serde_json::from_value(row.try_get("lines")?)?;
        let bank_type = match row.try_get::<Option<String>, _>("bank_type")? {
            Some(s) => Some(serde_json::from_value::<BankType>(
                serde_json::Value::String(s),
            )?),
            None => None,
        };

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            order_number: row.try_get("order_number")?,
            status,
            lines,
            coupon_id: row
                .try_get::<Option<Uuid>, _>("coupon_id")?
                .map(PromotionId::from_uuid),
            bank_type,
            tracking_code: row.try_get("tracking_code")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_log_entry(row: PgRow) -> Result<OrderStatusLogEntry> {
        let old_status: OrderStatus =
            serde_json::from_value(serde_json::Value::String(row.try_get("old_status")?))?;
        let new_status: OrderStatus =
            serde_json::from_value(serde_json::Value::String(row.try_get("new_status")?))?;

        Ok(OrderStatusLogEntry {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            old_status,
            new_status,
            actor: row
                .try_get::<Option<Uuid>, _>("actor")?
                .map(UserId::from_uuid),
            created_at: row.try_get("created_at")?,
        })
    }

    /// Loads and row-locks an order inside an open transaction.
    async fn lock_order(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Order> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        Self::row_to_order(row)
    }

    async fn append_log_entry(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_log (order_id, old_status, new_status, actor, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(old_status.as_str())
        .bind(new_status.as_str())
        .bind(actor.map(|a| a.as_uuid()))
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, title, price, stock, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.title)
        .bind(product.price.units())
        .bind(i64::from(product.stock))
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn insert_promotion(&self, promotion: Promotion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO promotions
                (id, title, kind, discount_percent, code, product_ids,
                 starts_at, ends_at, is_active, max_uses, used_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(promotion.id.as_uuid())
        .bind(&promotion.title)
        .bind(promotion.kind.as_str())
        .bind(i16::from(promotion.discount_percent))
        .bind(&promotion.code)
        .bind(serde_json::to_value(&promotion.product_ids)?)
        .bind(promotion.starts_at)
        .bind(promotion.ends_at)
        .bind(promotion.is_active)
        .bind(promotion.max_uses.map(i64::from))
        .bind(i64::from(promotion.used_count))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_promotion_code")
            {
                return StoreError::DuplicateCode;
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_promotion(&self, id: PromotionId) -> Result<Option<Promotion>> {
        let row = sqlx::query("SELECT * FROM promotions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_promotion).transpose()
    }

    async fn find_coupon(&self, code: &str) -> Result<Option<Promotion>> {
        let row = sqlx::query("SELECT * FROM promotions WHERE kind = 'COUPON' AND code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_promotion).transpose()
    }

    async fn list_promotions(&self, filter: PromotionFilter) -> Result<Vec<Promotion>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM promotions
            WHERE ($1::boolean IS NULL OR is_active = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::timestamptz IS NULL OR starts_at >= $3)
              AND ($4::timestamptz IS NULL OR ends_at <= $4)
            ORDER BY starts_at DESC
            "#,
        )
        .bind(filter.is_active)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.starts_after)
        .bind(filter.ends_before)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_promotion).collect()
    }

    async fn promotions_for_products(&self, product_ids: &[ProductId]) -> Result<Vec<Promotion>> {
        let ids: Vec<String> = product_ids.iter().map(|id| id.to_string()).collect();
        let rows = sqlx::query(
            "SELECT * FROM promotions WHERE kind = 'PRODUCT' AND product_ids ?| $1",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_promotion).collect()
    }

    async fn insert_cart_line(&self, line: CartLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_lines
                (id, user_id, product_id, quantity, coupon_id, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.user_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(i64::from(line.quantity))
        .bind(line.coupon_id.map(|c| c.as_uuid()))
        .bind(line.is_active)
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_cart_line(&self, id: LineId) -> Result<Option<CartLine>> {
        let row = sqlx::query("SELECT * FROM cart_lines WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_cart_line).transpose()
    }

    async fn active_lines_for_user(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM cart_lines
            WHERE user_id = $1 AND is_active
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_cart_line).collect()
    }

    async fn deactivate_cart_line(&self, id: LineId, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE cart_lines SET is_active = FALSE, updated_at = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cart line", id));
        }
        Ok(())
    }

    async fn set_cart_coupon(
        &self,
        user_id: UserId,
        coupon_id: Option<PromotionId>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE cart_lines SET coupon_id = $2, updated_at = $3
            WHERE user_id = $1 AND is_active
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(coupon_id.map(|c| c.as_uuid()))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, user_id, order_number, status, lines, coupon_id,
                 bank_type, tracking_code, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(serde_json::to_value(&order.lines)?)
        .bind(order.coupon_id.map(|c| c.as_uuid()))
        .bind(order.bank_type.map(|b| b.as_str()))
        .bind(&order.tracking_code)
        .bind(order.is_active)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_order_number")
            {
                return StoreError::DuplicateOrderNumber;
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn apply_transition(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let mut order = Self::lock_order(&mut tx, order_id).await?;
        if order.status != expected {
            return Err(StoreError::StatusConflict {
                order_id,
                expected,
                actual: order.status,
            });
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(new_status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        Self::append_log_entry(&mut tx, order_id, expected, new_status, actor, now).await?;

        tx.commit().await?;

        order.status = new_status;
        order.updated_at = now;
        Ok(order)
    }

    async fn apply_checkout(&self, plan: CheckoutPlan) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Lock order first, then products ascending, then the promotion.
        let mut order = Self::lock_order(&mut tx, plan.order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(StoreError::StatusConflict {
                order_id: plan.order_id,
                expected: OrderStatus::Pending,
                actual: order.status,
            });
        }

        let mut quantities: Vec<(ProductId, u32)> = Vec::new();
        for line in &order.lines {
            match quantities.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, quantity)) => *quantity += line.quantity,
                None => quantities.push((line.product_id, line.quantity)),
            }
        }
        quantities.sort_by_key(|(id, _)| id.as_uuid());

        let product_uuids: Vec<Uuid> = quantities.iter().map(|(id, _)| id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT * FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&product_uuids)
        .fetch_all(&mut *tx)
        .await?;
        let products: Vec<Product> = rows
            .into_iter()
            .map(Self::row_to_product)
            .collect::<Result<_>>()?;

        for (product_id, quantity) in &quantities {
            let product = products
                .iter()
                .find(|p| p.id == *product_id)
                .ok_or_else(|| StoreError::not_found("product", *product_id))?;
            if !product.has_stock(*quantity) {
                return Err(DomainError::InsufficientStock {
                    product_id: *product_id,
                }
                .into());
            }
        }

        if let Some(coupon_id) = order.coupon_id {
            let row = sqlx::query("SELECT * FROM promotions WHERE id = $1 FOR UPDATE")
                .bind(coupon_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::not_found("promotion", coupon_id))?;
            let promotion = Self::row_to_promotion(row)?;
            if !promotion.has_remaining_uses() {
                return Err(DomainError::PromotionExhausted.into());
            }

            sqlx::query("UPDATE promotions SET used_count = used_count + 1 WHERE id = $1")
                .bind(coupon_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        for (product_id, quantity) in &quantities {
            sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2,
                    is_active = (stock - $2 > 0) AND is_active,
                    updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(product_id.as_uuid())
            .bind(i64::from(*quantity))
            .bind(plan.now)
            .execute(&mut *tx)
            .await?;
        }

        let line_uuids: Vec<Uuid> = order.lines.iter().map(|l| l.line_id.as_uuid()).collect();
        sqlx::query(
            "UPDATE cart_lines SET is_active = FALSE, updated_at = $2 WHERE id = ANY($1)",
        )
        .bind(&line_uuids)
        .bind(plan.now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, bank_type = $3, tracking_code = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(plan.order_id.as_uuid())
        .bind(OrderStatus::Paid.as_str())
        .bind(plan.bank_type.as_str())
        .bind(&plan.tracking_code)
        .bind(plan.now)
        .execute(&mut *tx)
        .await?;

        Self::append_log_entry(
            &mut tx,
            plan.order_id,
            OrderStatus::Pending,
            OrderStatus::Paid,
            None,
            plan.now,
        )
        .await?;

        tx.commit().await?;

        order.status = OrderStatus::Paid;
        order.bank_type = Some(plan.bank_type);
        order.tracking_code = Some(plan.tracking_code);
        order.updated_at = plan.now;
        Ok(order)
    }

    async fn status_logs_for_order(&self, order_id: OrderId) -> Result<Vec<OrderStatusLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM order_status_log WHERE order_id = $1 ORDER BY id DESC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_log_entry).collect()
    }
}
