//! Persistence boundary for the storefront core.
//!
//! The [`CommerceStore`] trait is the only way the rest of the system
//! reaches storage. Besides plain reads and inserts it exposes exactly two
//! transactional units, [`CommerceStore::apply_transition`] and
//! [`CommerceStore::apply_checkout`], which re-validate their
//! preconditions inside the lock so that checks done outside them are
//! advisory only.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use retry::{RetryPolicy, with_retries};
pub use store::{CheckoutPlan, CommerceStore, PromotionFilter};
