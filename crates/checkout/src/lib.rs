//! Services over the domain and the store.
//!
//! - [`OrderLifecycle`] creates orders from carts and drives legal status
//!   transitions (with their audit entries).
//! - [`PaymentOrchestrator`] reacts to gateway confirmations: status
//!   change, inventory decrement, cart deactivation, and coupon
//!   redemption as one transactional unit.
//! - [`PromotionService`] and [`CartService`] cover coupon validation /
//!   application and cart management with cached totals.

pub mod cache;
pub mod cart;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod orchestrator;
pub mod promotions;

pub use cache::CartTotalsCache;
pub use cart::{CartService, CartView};
pub use error::CheckoutError;
pub use gateway::PaymentConfirmation;
pub use lifecycle::OrderLifecycle;
pub use orchestrator::PaymentOrchestrator;
pub use promotions::PromotionService;
