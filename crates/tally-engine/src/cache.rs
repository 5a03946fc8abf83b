//! # Inventory Status Cache
//!
//! Per-company TTL cache for inventory status snapshots.
//!
//! The status query walks every movement of every active product, so the
//! listing is cached for a short window. Any ledger writer invalidates its
//! company's entry synchronously alongside (not gating) its own
//! transaction; a stale read within the TTL is an accepted tradeoff.
//!
//! Invalidation is an explicit call on this type, not ambient state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tally_core::InventoryStatusRow;

/// How long a cached snapshot may serve reads.
pub const STATUS_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedStatus {
    stored_at: Instant,
    rows: Vec<InventoryStatusRow>,
}

/// Shared, best-effort cache of inventory status listings, keyed by company.
pub struct StatusCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedStatus>>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        StatusCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached snapshot for a company if it is still fresh.
    /// Expired entries are dropped on the way out.
    pub fn get(&self, company_id: &str) -> Option<Vec<InventoryStatusRow>> {
        let mut entries = self.entries.lock().expect("status cache poisoned");

        match entries.get(company_id) {
            Some(cached) if cached.stored_at.elapsed() < self.ttl => Some(cached.rows.clone()),
            Some(_) => {
                entries.remove(company_id);
                None
            }
            None => None,
        }
    }

    /// Stores a fresh snapshot for a company.
    pub fn put(&self, company_id: &str, rows: Vec<InventoryStatusRow>) {
        let mut entries = self.entries.lock().expect("status cache poisoned");
        entries.insert(
            company_id.to_string(),
            CachedStatus {
                stored_at: Instant::now(),
                rows,
            },
        );
    }

    /// Drops a company's snapshot. Called by every ledger writer.
    pub fn invalidate(&self, company_id: &str) {
        let mut entries = self.entries.lock().expect("status cache poisoned");
        entries.remove(company_id);
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        StatusCache::new(STATUS_CACHE_TTL)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sku: &str, stock: i64) -> InventoryStatusRow {
        InventoryStatusRow {
            product_id: format!("p-{sku}"),
            sku: sku.to_string(),
            name: sku.to_string(),
            cost_cents: 100,
            price_cents: 150,
            current_stock: stock,
            total_value_cents: stock * 100,
            projected_profit_cents: stock * 50,
        }
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = StatusCache::default();
        assert!(cache.get("c1").is_none());

        cache.put("c1", vec![row("A", 5)]);
        let cached = cache.get("c1").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].current_stock, 5);

        cache.invalidate("c1");
        assert!(cache.get("c1").is_none());
    }

    #[test]
    fn test_companies_are_isolated() {
        let cache = StatusCache::default();
        cache.put("c1", vec![row("A", 5)]);
        cache.put("c2", vec![row("B", 9)]);

        cache.invalidate("c1");
        assert!(cache.get("c1").is_none());
        assert_eq!(cache.get("c2").unwrap()[0].current_stock, 9);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = StatusCache::new(Duration::ZERO);
        cache.put("c1", vec![row("A", 5)]);
        assert!(cache.get("c1").is_none());
    }
}
