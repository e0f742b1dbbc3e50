//! Promotions and the discount engine.

use chrono::{DateTime, Utc};
use common::{ProductId, PromotionId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// The two promotion flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionKind {
    /// Applies automatically to every product listed on the promotion.
    Product,
    /// Redeemed explicitly through a coupon code, applied cart-wide.
    Coupon,
}

impl PromotionKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionKind::Product => "PRODUCT",
            PromotionKind::Coupon => "COUPON",
        }
    }
}

impl std::fmt::Display for PromotionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a promotion.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPromotion {
    pub title: String,
    pub kind: PromotionKind,
    pub discount_percent: u8,
    pub code: Option<String>,
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// None means unlimited redemptions.
    pub max_uses: Option<u32>,
}

/// A discount rule, either product-scoped or coupon-redeemable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub title: String,
    pub kind: PromotionKind,
    /// Percentage discount, 0–100 inclusive.
    pub discount_percent: u8,
    /// Unique coupon code; present iff `kind` is `Coupon`.
    pub code: Option<String>,
    /// Products the promotion applies to when `kind` is `Product`.
    pub product_ids: Vec<ProductId>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    /// None means unlimited redemptions.
    pub max_uses: Option<u32>,
    /// Monotone redemption counter; never exceeds `max_uses`.
    pub used_count: u32,
}

impl Promotion {
    /// Validates and creates a promotion.
    ///
    /// `ends_at` must lie in the future at creation time, and a coupon
    /// code is required exactly when the kind is `Coupon`.
    pub fn new(input: NewPromotion, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if input.title.is_empty() {
            return Err(DomainError::validation("title", "title is required"));
        }
        if input.discount_percent > 100 {
            return Err(DomainError::validation(
                "discount_percent",
                "discount percentage must be between 0 and 100",
            ));
        }
        if input.ends_at <= now {
            return Err(DomainError::validation(
                "ends_at",
                "end date must be in the future",
            ));
        }
        if input.starts_at >= input.ends_at {
            return Err(DomainError::validation(
                "starts_at",
                "start date must precede end date",
            ));
        }
        if let Some(max_uses) = input.max_uses
            && max_uses == 0
        {
            return Err(DomainError::validation(
                "max_uses",
                "usage cap must be greater than zero",
            ));
        }

        let code = match (input.kind, input.code) {
            (PromotionKind::Coupon, Some(code)) => {
                validate_code_format(&code)?;
                Some(code)
            }
            (PromotionKind::Coupon, None) => {
                return Err(DomainError::validation(
                    "code",
                    "coupon promotions require a code",
                ));
            }
            (PromotionKind::Product, Some(_)) => {
                return Err(DomainError::validation(
                    "code",
                    "product promotions cannot carry a code",
                ));
            }
            (PromotionKind::Product, None) => None,
        };

        Ok(Self {
            id: PromotionId::new(),
            title: input.title,
            kind: input.kind,
            discount_percent: input.discount_percent,
            code,
            product_ids: input.product_ids,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            is_active: true,
            max_uses: input.max_uses,
            used_count: 0,
        })
    }

    /// Returns true if the promotion can be applied at `now`.
    ///
    /// Active flag, validity window (inclusive on both ends), and usage cap
    /// must all hold.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at <= now
            && now <= self.ends_at
            && self.has_remaining_uses()
    }

    /// Returns true if the usage cap has not been reached.
    pub fn has_remaining_uses(&self) -> bool {
        match self.max_uses {
            Some(max) => self.used_count < max,
            None => true,
        }
    }

    /// Returns the discount for `base`: `floor(base * percent / 100)`.
    ///
    /// Integer truncation is the defined behavior, kept bit-exact.
    pub fn discount_amount(&self, base: Money) -> Money {
        Money::from_units(base.units() * i64::from(self.discount_percent) / 100)
    }

    /// Returns true if a product-kind promotion covers `product_id`.
    pub fn applies_to(&self, product_id: ProductId) -> bool {
        self.kind == PromotionKind::Product && self.product_ids.contains(&product_id)
    }
}

/// Coupon codes are 1–30 alphanumeric characters.
fn validate_code_format(code: &str) -> Result<(), DomainError> {
    if code.is_empty() || code.len() > 30 {
        return Err(DomainError::validation(
            "code",
            "coupon code must be 1 to 30 characters",
        ));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::validation(
            "code",
            "coupon code can only contain letters and numbers",
        ));
    }
    Ok(())
}
