//! Catalog product.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// A product in the catalog.
///
/// Owned by the catalog service; the payment orchestrator is the only
/// writer of `stock` and the only component allowed to flip `is_active`
/// when stock runs out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    /// Base price in the smallest currency unit.
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new active product.
    pub fn new(
        title: impl Into<String>,
        price: Money,
        stock: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let title = title.into();
        if title.is_empty() {
            return Err(DomainError::validation("title", "title is required"));
        }
        if !price.is_positive() {
            return Err(DomainError::validation(
                "price",
                "price must be greater than zero",
            ));
        }

        Ok(Self {
            id: ProductId::new(),
            title,
            price,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns true if `quantity` units can currently be taken from stock.
    pub fn has_stock(&self, quantity: u32) -> bool {
        quantity <= self.stock
    }

    /// Removes `quantity` units from stock, deactivating the product when
    /// stock reaches exactly zero.
    pub fn take_stock(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.has_stock(quantity) {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
            });
        }

        self.stock -= quantity;
        if self.stock == 0 {
            self.is_active = false;
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn new_product_is_active() {
        let product = Product::new("Widget", Money::from_units(1000), 5, now()).unwrap();
        assert!(product.is_active);
        assert_eq!(product.stock, 5);
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = Product::new("Widget", Money::zero(), 5, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "price", .. }));
    }

    #[test]
    fn rejects_empty_title() {
        let err = Product::new("", Money::from_units(10), 5, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "title", .. }));
    }

    #[test]
    fn take_stock_decrements() {
        let mut product = Product::new("Widget", Money::from_units(1000), 5, now()).unwrap();
        product.take_stock(3, now()).unwrap();
        assert_eq!(product.stock, 2);
        assert!(product.is_active);
    }

    #[test]
    fn take_stock_deactivates_at_zero() {
        let mut product = Product::new("Widget", Money::from_units(1000), 2, now()).unwrap();
        product.take_stock(2, now()).unwrap();
        assert_eq!(product.stock, 0);
        assert!(!product.is_active);
    }

    #[test]
    fn take_stock_rejects_overdraw() {
        let mut product = Product::new("Widget", Money::from_units(1000), 2, now()).unwrap();
        let err = product.take_stock(3, now()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        // Nothing changed on failure.
        assert_eq!(product.stock, 2);
        assert!(product.is_active);
    }
}
