//! Shared identifier types used across the storefront crates.

mod ids;

pub use ids::{LineId, OrderId, ProductId, PromotionId, UserId};
