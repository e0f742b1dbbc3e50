//! Promotion management and coupon application.

use chrono::{DateTime, Utc};
use common::{PromotionId, UserId};
use domain::{DomainError, NewPromotion, Promotion};
use store::{CommerceStore, PromotionFilter, StoreError};

use crate::cache::CartTotalsCache;
use crate::error::CheckoutError;

/// Admin-facing promotion management plus the user-facing coupon flow.
///
/// Redemption itself is not here: usage counters move only inside the
/// payment transaction (`apply_checkout`), never from a validation or
/// application call.
pub struct PromotionService<S> {
    store: S,
    cache: CartTotalsCache,
}

impl<S: CommerceStore> PromotionService<S> {
    /// Creates a new promotion service sharing the given totals cache.
    pub fn new(store: S, cache: CartTotalsCache) -> Self {
        Self { store, cache }
    }

    /// Creates a promotion after domain validation.
    #[tracing::instrument(skip(self, input), fields(kind = %input.kind))]
    pub async fn create(
        &self,
        input: NewPromotion,
        now: DateTime<Utc>,
    ) -> Result<Promotion, CheckoutError> {
        let promotion = Promotion::new(input, now)?;

        match self.store.insert_promotion(promotion.clone()).await {
            Ok(()) => {}
            Err(StoreError::DuplicateCode) => {
                return Err(
                    DomainError::validation("code", "coupon code is already in use").into(),
                );
            }
            Err(e) => return Err(e.into()),
        }

        // Pricing inputs changed for everyone.
        self.cache.flush().await;
        tracing::info!(promotion_id = %promotion.id, "promotion created");
        Ok(promotion)
    }

    /// Admin listing with filters.
    pub async fn list(&self, filter: PromotionFilter) -> Result<Vec<Promotion>, CheckoutError> {
        Ok(self.store.list_promotions(filter).await?)
    }

    /// Loads one promotion.
    pub async fn get(&self, id: PromotionId) -> Result<Promotion, CheckoutError> {
        self.store
            .get_promotion(id)
            .await?
            .ok_or(DomainError::PromotionNotFound.into())
    }

    /// Looks up an active coupon by code and reports its validity.
    ///
    /// `PromotionNotFound` when no coupon carries the code;
    /// `PromotionExpired` when one does but its window, active flag, or
    /// usage cap rejects it.
    #[tracing::instrument(skip(self))]
    pub async fn validate_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Promotion, CheckoutError> {
        let promotion = self
            .store
            .find_coupon(code)
            .await?
            .ok_or(DomainError::PromotionNotFound)?;

        if !promotion.is_valid(now) {
            return Err(DomainError::PromotionExpired.into());
        }
        Ok(promotion)
    }

    /// Attaches a valid coupon to the user's active cart lines.
    ///
    /// This only marks the cart; the coupon is consumed at payment time.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        user_id: UserId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Promotion, CheckoutError> {
        let promotion = self.validate_code(code, now).await?;

        let touched = self
            .store
            .set_cart_coupon(user_id, Some(promotion.id), now)
            .await?;
        if touched == 0 {
            return Err(DomainError::validation("cart", "cart is empty").into());
        }

        self.cache.invalidate(user_id).await;
        tracing::info!(promotion_id = %promotion.id, touched, "coupon applied to cart");
        Ok(promotion)
    }
}
