//! Cart management with cached totals.

use chrono::{DateTime, Utc};
use common::{LineId, ProductId, UserId};
use domain::{CartLine, CartTotals, PricedLine, pricing};
use store::CommerceStore;

use crate::cache::CartTotalsCache;
use crate::error::CheckoutError;

/// A user's active cart plus its computed totals.
#[derive(Debug, Clone)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub totals: CartTotals,
}

/// Cart line management and totals computation.
///
/// Totals are served from a short-TTL cache keyed by user; every mutation
/// of that user's cart invalidates their entry.
pub struct CartService<S> {
    store: S,
    cache: CartTotalsCache,
}

impl<S: CommerceStore> CartService<S> {
    /// Creates a new cart service sharing the given totals cache.
    pub fn new(store: S, cache: CartTotalsCache) -> Self {
        Self { store, cache }
    }

    /// Adds a line to the user's cart.
    ///
    /// An already-applied cart coupon is carried onto the new line so the
    /// cart stays uniformly couponed.
    #[tracing::instrument(skip(self))]
    pub async fn add_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartLine, CheckoutError> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))?;

        let mut line = CartLine::new(user_id, &product, quantity, now)?;
        let existing = self.store.active_lines_for_user(user_id).await?;
        line.coupon_id = existing.iter().find_map(|l| l.coupon_id);

        self.store.insert_cart_line(line.clone()).await?;
        self.cache.invalidate(user_id).await;
        Ok(line)
    }

    /// Soft-deletes one of the user's cart lines.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(
        &self,
        user_id: UserId,
        line_id: LineId,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        let line = self
            .store
            .get_cart_line(line_id)
            .await?
            .filter(|l| l.user_id == user_id && l.is_active)
            .ok_or(CheckoutError::LineNotFound(line_id))?;

        self.store.deactivate_cart_line(line.id, now).await?;
        self.cache.invalidate(user_id).await;
        Ok(())
    }

    /// Returns the user's active lines with totals, serving totals from
    /// the cache when fresh.
    #[tracing::instrument(skip(self))]
    pub async fn view(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CartView, CheckoutError> {
        let lines = self.store.active_lines_for_user(user_id).await?;
        if lines.is_empty() {
            return Ok(CartView {
                lines,
                totals: CartTotals::default(),
            });
        }

        if let Some(totals) = self.cache.get(user_id).await {
            return Ok(CartView { lines, totals });
        }

        let totals = self.compute_totals(&lines, now).await?;
        self.cache.put(user_id, totals).await;
        Ok(CartView { lines, totals })
    }

    async fn compute_totals(
        &self,
        lines: &[CartLine],
        now: DateTime<Utc>,
    ) -> Result<CartTotals, CheckoutError> {
        let product_ids: Vec<_> = lines.iter().map(|l| l.product_id).collect();
        let promotions = self.store.promotions_for_products(&product_ids).await?;

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
            priced.push(PricedLine::new(
                pricing::effective_unit_price(&product, &promotions, now),
                line.quantity,
            ));
        }

        let coupon = match lines.iter().find_map(|l| l.coupon_id) {
            Some(coupon_id) => self.store.get_promotion(coupon_id).await?,
            None => None,
        };

        Ok(pricing::cart_totals(&priced, coupon.as_ref(), now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, NewPromotion, Product, Promotion, PromotionKind};
    use std::time::Duration;
    use store::InMemoryStore;

    fn service(store: InMemoryStore) -> CartService<InMemoryStore> {
        CartService::new(store, CartTotalsCache::new(Duration::from_secs(60)))
    }

    async fn seed_product(store: &InMemoryStore, price: i64, stock: u32) -> Product {
        let product = Product::new("Widget", Money::from_units(price), stock, Utc::now()).unwrap();
        store.insert_product(product.clone()).await.unwrap();
        product
    }

    #[tokio::test]
    async fn add_and_view() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000, 5).await;
        let cart = service(store);
        let user = UserId::new();

        cart.add_line(user, product.id, 2, Utc::now()).await.unwrap();
        let view = cart.view(user, Utc::now()).await.unwrap();

        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.totals.subtotal, Money::from_units(2000));
        assert_eq!(view.totals.final_total, Money::from_units(2000));
    }

    #[tokio::test]
    async fn add_rejects_unknown_product() {
        let store = InMemoryStore::new();
        let cart = service(store);
        let err = cart
            .add_line(UserId::new(), ProductId::new(), 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn remove_line_excludes_it_from_totals() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000, 5).await;
        let cart = service(store);
        let user = UserId::new();

        let line = cart.add_line(user, product.id, 2, Utc::now()).await.unwrap();
        cart.remove_line(user, line.id, Utc::now()).await.unwrap();

        let view = cart.view(user, Utc::now()).await.unwrap();
        assert!(view.lines.is_empty());
        assert_eq!(view.totals, CartTotals::default());
    }

    #[tokio::test]
    async fn remove_rejects_foreign_line() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000, 5).await;
        let cart = service(store);

        let owner = UserId::new();
        let line = cart
            .add_line(owner, product.id, 1, Utc::now())
            .await
            .unwrap();

        let err = cart
            .remove_line(UserId::new(), line.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::LineNotFound(_)));
    }

    #[tokio::test]
    async fn totals_include_product_promotion() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000, 5).await;

        let now = Utc::now();
        let promo = Promotion::new(
            NewPromotion {
                title: "30 off".to_string(),
                kind: PromotionKind::Product,
                discount_percent: 30,
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

        let cart = service(store);
        let user = UserId::new();
        cart.add_line(user, product.id, 2, now).await.unwrap();

        let view = cart.view(user, now).await.unwrap();
        assert_eq!(view.totals.subtotal, Money::from_units(1400));
    }

    #[tokio::test]
    async fn stale_cache_entry_is_not_used_after_mutation() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000, 10).await;
        let cart = service(store);
        let user = UserId::new();

        cart.add_line(user, product.id, 1, Utc::now()).await.unwrap();
        let first = cart.view(user, Utc::now()).await.unwrap();
        assert_eq!(first.totals.subtotal, Money::from_units(1000));

        // The second add must invalidate the cached totals.
        cart.add_line(user, product.id, 1, Utc::now()).await.unwrap();
        let second = cart.view(user, Utc::now()).await.unwrap();
        assert_eq!(second.totals.subtotal, Money::from_units(2000));
    }
}
