//! Short-lived cache for cart totals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::UserId;
use domain::CartTotals;
use tokio::sync::RwLock;

struct Entry {
    totals: CartTotals,
    expires_at: Instant,
}

/// TTL cache for per-user cart totals.
///
/// An optimization only, never a source of truth: callers invalidate a
/// user's entry whenever one of their cart lines changes, and flush the
/// whole cache whenever a promotion changes.
#[derive(Clone)]
pub struct CartTotalsCache {
    entries: Arc<RwLock<HashMap<UserId, Entry>>>,
    ttl: Duration,
}

impl CartTotalsCache {
    /// Creates a cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the cached totals for `user_id` if still fresh.
    pub async fn get(&self, user_id: UserId) -> Option<CartTotals> {
        let entries = self.entries.read().await;
        entries
            .get(&user_id)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.totals)
    }

    /// Stores totals for `user_id`.
    pub async fn put(&self, user_id: UserId, totals: CartTotals) {
        let mut entries = self.entries.write().await;
        entries.insert(
            user_id,
            Entry {
                totals,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drops the entry for one user.
    pub async fn invalidate(&self, user_id: UserId) {
        self.entries.write().await.remove(&user_id);
    }

    /// Drops every entry; used when a promotion changes.
    pub async fn flush(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for CartTotalsCache {
    fn default() -> Self {
        // The original served cart totals from a 5-minute cache.
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Money;

    fn totals(subtotal: i64) -> CartTotals {
        CartTotals {
            subtotal: Money::from_units(subtotal),
            coupon_discount: Money::zero(),
            final_total: Money::from_units(subtotal),
            items_count: 1,
            total_quantity: 1,
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = CartTotalsCache::new(Duration::from_secs(60));
        let user = UserId::new();
        cache.put(user, totals(100)).await;
        assert_eq!(cache.get(user).await, Some(totals(100)));
        assert_eq!(cache.get(UserId::new()).await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() {
        let cache = CartTotalsCache::new(Duration::from_millis(5));
        let user = UserId::new();
        cache.put(user, totals(100)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(user).await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_single_user() {
        let cache = CartTotalsCache::new(Duration::from_secs(60));
        let a = UserId::new();
        let b = UserId::new();
        cache.put(a, totals(100)).await;
        cache.put(b, totals(200)).await;

        cache.invalidate(a).await;
        assert_eq!(cache.get(a).await, None);
        assert_eq!(cache.get(b).await, Some(totals(200)));
    }

    #[tokio::test]
    async fn flush_removes_everything() {
        let cache = CartTotalsCache::new(Duration::from_secs(60));
        let a = UserId::new();
        let b = UserId::new();
        cache.put(a, totals(100)).await;
        cache.put(b, totals(200)).await;

        cache.flush().await;
        assert_eq!(cache.get(a).await, None);
        assert_eq!(cache.get(b).await, None);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = CartTotalsCache::new(Duration::from_secs(60));
        let clone = cache.clone();
        let user = UserId::new();
        cache.put(user, totals(100)).await;
        assert_eq!(clone.get(user).await, Some(totals(100)));
    }
}
