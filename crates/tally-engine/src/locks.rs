//! # Product Lock Registry
//!
//! Per-product advisory locks serializing the stock check with the exit
//! write that follows it.
//!
//! ## Why
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Without the lock, two settlements can both observe stock = 10,         │
//! │  both decide an exit of 7 is fine, and both write it:                   │
//! │                                                                         │
//! │     A: read 10 ─┐                                                       │
//! │     B: read 10 ─┤─► A: write −7 ─► B: write −7 ─► stock = −4  ❌        │
//! │                                                                         │
//! │  Holding the product's lock across check+write makes the pair           │
//! │  serializable:                                                          │
//! │                                                                         │
//! │     A: lock, read 10, write −7, unlock                                  │
//! │     B: lock, read 3, reject (insufficient), unlock          ✓           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Multi-product settlements take locks in sorted id order, so two
//! settlements over overlapping carts can never deadlock. Entry writes
//! (stock increases) don't take locks at all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-product advisory locks.
///
/// Lock handles are created lazily and kept for the registry's lifetime;
/// the registry is shared by every service touching the ledger.
#[derive(Default)]
pub struct ProductLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        ProductLocks::default()
    }

    fn handle(&self, product_id: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().expect("lock registry poisoned");
        map.entry(product_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquires the lock for one product, waiting if another holder exists.
    pub async fn acquire(&self, product_id: &str) -> OwnedMutexGuard<()> {
        self.handle(product_id).lock_owned().await
    }

    /// Acquires locks for a set of products in sorted, deduplicated order.
    ///
    /// The ordering is what prevents deadlock between two settlements over
    /// overlapping product sets.
    pub async fn acquire_many(&self, product_ids: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids: Vec<&String> = product_ids.iter().collect();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await);
        }
        guards
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
