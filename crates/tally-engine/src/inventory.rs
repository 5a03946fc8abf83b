//! # Inventory Service
//!
//! The inventory ledger's service layer: validated entries and exits,
//! stock policy, the cached status listing, and stale-product detection.
//!
//! ## Transaction + Lock Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  register_entry:   [tx: validate product → append entry]               │
//! │                    stock only grows - no lock needed                    │
//! │                                                                         │
//! │  create_exit:      lock(product) {                                      │
//! │                        [tx: validate → check stock → append exit]       │
//! │                    }                                                    │
//! │                    the check and the write are inseparable              │
//! │                                                                         │
//! │  Both invalidate the company's status cache after commit.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};
use uuid::Uuid;

use tally_core::{
    Clock, CoreError, InventoryMovement, InventoryStatusRow, MovementKind, Product,
};
use tally_db::{Database, DbError};

use crate::cache::StatusCache;
use crate::error::EngineResult;
use crate::locks::ProductLocks;

/// Default staleness horizon for [`InventoryService::stale_products`].
pub const STALE_DAYS_DEFAULT: i64 = 90;

/// Service over the append-only inventory ledger.
#[derive(Clone)]
pub struct InventoryService {
    db: Database,
    clock: Arc<dyn Clock>,
    cache: Arc<StatusCache>,
    locks: Arc<ProductLocks>,
}

impl InventoryService {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        cache: Arc<StatusCache>,
        locks: Arc<ProductLocks>,
    ) -> Self {
        InventoryService {
            db,
            clock,
            cache,
            locks,
        }
    }

    /// Records stock received into inventory.
    ///
    /// ## Errors
    /// * `InvalidQuantity` / `InvalidMoney` - bad inputs, checked first
    /// * `ProductNotFound` / `ProductCompanyMismatch` - validated inside the
    ///   transaction, before the write
    pub async fn register_entry(
        &self,
        company_id: &str,
        product_id: &str,
        quantity: i64,
        unit_cost_cents: i64,
        notes: Option<String>,
    ) -> EngineResult<InventoryMovement> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity(quantity).into());
        }
        if unit_cost_cents < 0 {
            return Err(CoreError::InvalidMoney(unit_cost_cents).into());
        }

        let now = self.clock.now();
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let product = self
            .load_owned_product(&mut tx, company_id, product_id)
            .await?;

        let movement = InventoryMovement {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            product_id: product.id.clone(),
            kind: MovementKind::Entry,
            quantity,
            unit_cost_cents: Some(unit_cost_cents),
            sale_id: None,
            entry_date: now,
            notes,
            created_at: now,
        };
        self.db.inventory().insert(&mut *tx, &movement).await?;

        tx.commit().await.map_err(DbError::from)?;
        self.cache.invalidate(company_id);

        info!(
            company_id,
            sku = %product.sku,
            quantity,
            unit_cost_cents,
            "Inventory entry recorded"
        );

        Ok(movement)
    }

    /// Records stock leaving inventory, priced at the product's current
    /// cost.
    ///
    /// The stock check and the exit write run under the product's advisory
    /// lock inside one transaction - a concurrent exit against the same
    /// product observes either all of this one or none of it.
    ///
    /// ## Errors
    /// * `InsufficientStock` - current stock < quantity; no row is written
    pub async fn create_exit(
        &self,
        company_id: &str,
        product_id: &str,
        quantity: i64,
        sale_id: Option<&str>,
    ) -> EngineResult<InventoryMovement> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity(quantity).into());
        }

        let _guard = self.locks.acquire(product_id).await;

        let now = self.clock.now();
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let product = self
            .load_owned_product(&mut tx, company_id, product_id)
            .await?;
        let movement = self
            .record_exit_in_tx(&mut tx, &product, quantity, sale_id.map(str::to_string), now)
            .await?;

        tx.commit().await.map_err(DbError::from)?;
        self.cache.invalidate(company_id);

        info!(
            company_id,
            sku = %product.sku,
            quantity,
            sale_id = ?movement.sale_id,
            "Inventory exit recorded"
        );

        Ok(movement)
    }

    /// Checks stock and appends one exit inside the caller's transaction.
    ///
    /// The caller must hold the product's advisory lock; the settlement
    /// worker uses this to write all of a sale's exits in a single
    /// transaction with the status flip.
    pub(crate) async fn record_exit_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        product: &Product,
        quantity: i64,
        sale_id: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<InventoryMovement> {
        let inventory = self.db.inventory();

        let available = inventory.current_stock(&mut **tx, &product.id).await?;
        if available < quantity {
            return Err(CoreError::InsufficientStock {
                sku: product.sku.clone(),
                requested: quantity,
                available,
            }
            .into());
        }

        let movement = InventoryMovement {
            id: Uuid::new_v4().to_string(),
            company_id: product.company_id.clone(),
            product_id: product.id.clone(),
            kind: MovementKind::Exit,
            quantity,
            unit_cost_cents: Some(product.cost_cents),
            sale_id,
            entry_date: now,
            notes: None,
            created_at: now,
        };
        inventory.insert(&mut **tx, &movement).await?;

        Ok(movement)
    }

    /// Current stock for a product: the signed sum of its movements.
    pub async fn current_stock(&self, product_id: &str) -> EngineResult<i64> {
        Ok(self
            .db
            .inventory()
            .current_stock(self.db.pool(), product_id)
            .await?)
    }

    /// Stock policy: is `quantity` available right now?
    ///
    /// Pure read. Settlement re-evaluates this under the product lock
    /// inside its own transaction; this entry point is for callers that
    /// only want the answer.
    pub async fn has_available_stock(
        &self,
        product_id: &str,
        quantity: i64,
    ) -> EngineResult<bool> {
        Ok(self.current_stock(product_id).await? >= quantity)
    }

    /// Inventory status listing for a company's active products, served
    /// through the TTL cache.
    pub async fn inventory_status(
        &self,
        company_id: &str,
    ) -> EngineResult<Vec<InventoryStatusRow>> {
        if let Some(rows) = self.cache.get(company_id) {
            debug!(company_id, "Inventory status served from cache");
            return Ok(rows);
        }

        let rows = self.db.inventory().inventory_status(company_id).await?;
        self.cache.put(company_id, rows.clone());
        Ok(rows)
    }

    /// Drops the cached status snapshot for a company.
    pub fn invalidate_status(&self, company_id: &str) {
        self.cache.invalidate(company_id);
    }

    /// Products whose most recent movement is older than `days_old` days,
    /// or which have never moved at all.
    pub async fn stale_products(
        &self,
        company_id: &str,
        days_old: i64,
    ) -> EngineResult<Vec<Product>> {
        let cutoff = self.clock.now() - Duration::days(days_old);
        Ok(self
            .db
            .inventory()
            .stale_products(company_id, cutoff)
            .await?)
    }

    /// A product's movement history, most recent first.
    pub async fn movements_for_product(
        &self,
        product_id: &str,
    ) -> EngineResult<Vec<InventoryMovement>> {
        Ok(self.db.inventory().for_product(product_id).await?)
    }

    /// A company's movement history, most recent first.
    pub async fn movements_for_company(
        &self,
        company_id: &str,
    ) -> EngineResult<Vec<InventoryMovement>> {
        Ok(self.db.inventory().for_company(company_id).await?)
    }

    /// Takes the advisory locks for a set of products (sorted, deduped).
    /// Held by the settlement worker across its check+write transaction.
    pub(crate) async fn lock_products(
        &self,
        product_ids: &[String],
    ) -> Vec<OwnedMutexGuard<()>> {
        self.locks.acquire_many(product_ids).await
    }

    async fn load_owned_product(
        &self,
        conn: &mut SqliteConnection,
        company_id: &str,
        product_id: &str,
    ) -> EngineResult<Product> {
        let product = self
            .db
            .products()
            .find_by_id(&mut *conn, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        if product.company_id != company_id {
            return Err(CoreError::ProductCompanyMismatch {
                product_id: product.id,
                company_id: company_id.to_string(),
            }
            .into());
        }

        Ok(product)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use chrono::TimeZone;
    use tally_core::FixedClock;
    use tally_db::DbConfig;

    async fn harness() -> (Database, InventoryService, Arc<FixedClock>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
        ));
        let service = InventoryService::new(
            db.clone(),
            clock.clone(),
            Arc::new(StatusCache::default()),
            Arc::new(ProductLocks::new()),
        );
        (db, service, clock)
    }

    async fn seed_product(db: &Database, company_id: &str, sku: &str) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            description: None,
            cost_cents: 10000,
            price_cents: 15000,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_register_entry_stamps_clock_and_cost() {
        let (db, service, clock) = harness().await;
        let p = seed_product(&db, "c1", "ENT-01").await;

        let movement = service
            .register_entry("c1", &p.id, 50, 10000, Some("initial load".into()))
            .await
            .unwrap();

        assert_eq!(movement.kind, MovementKind::Entry);
        assert_eq!(movement.quantity, 50);
        assert_eq!(movement.unit_cost_cents, Some(10000));
        assert_eq!(movement.entry_date, clock.now());
        assert_eq!(service.current_stock(&p.id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_register_entry_validation() {
        let (db, service, _) = harness().await;
        let p = seed_product(&db, "c1", "VAL-01").await;

        let err = service.register_entry("c1", &p.id, 0, 100, None).await;
        assert!(matches!(
            err,
            Err(EngineError::Core(CoreError::InvalidQuantity(0)))
        ));

        let err = service.register_entry("c1", &p.id, 5, -1, None).await;
        assert!(matches!(
            err,
            Err(EngineError::Core(CoreError::InvalidMoney(-1)))
        ));

        let err = service.register_entry("c1", "missing", 5, 100, None).await;
        assert!(matches!(
            err,
            Err(EngineError::Core(CoreError::ProductNotFound(_)))
        ));

        // Product exists but belongs to another company.
        let foreign = seed_product(&db, "c2", "VAL-02").await;
        let err = service.register_entry("c1", &foreign.id, 5, 100, None).await;
        assert!(matches!(
            err,
            Err(EngineError::Core(CoreError::ProductCompanyMismatch { .. }))
        ));

        // Nothing was written by any of the rejected calls.
        assert_eq!(service.current_stock(&p.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exit_snapshots_product_cost() {
        let (db, service, _) = harness().await;
        let p = seed_product(&db, "c1", "EXIT-01").await;

        service.register_entry("c1", &p.id, 10, 9000, None).await.unwrap();
        let exit = service.create_exit("c1", &p.id, 4, None).await.unwrap();

        // Exit is priced at the product's catalog cost, not the entry's.
        assert_eq!(exit.unit_cost_cents, Some(p.cost_cents));
        assert_eq!(service.current_stock(&p.id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_insufficient_stock_writes_nothing() {
        let (db, service, _) = harness().await;
        let p = seed_product(&db, "c1", "SHORT-01").await;

        service.register_entry("c1", &p.id, 10, 100, None).await.unwrap();

        let err = service.create_exit("c1", &p.id, 15, None).await.unwrap_err();
        match err {
            EngineError::Core(CoreError::InsufficientStock {
                sku,
                requested,
                available,
            }) => {
                assert_eq!(sku, "SHORT-01");
                assert_eq!(requested, 15);
                assert_eq!(available, 10);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(service.current_stock(&p.id).await.unwrap(), 10);
        let movements = service.movements_for_product(&p.id).await.unwrap();
        assert_eq!(movements.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_exits_never_oversubscribe() {
        let (db, service, _) = harness().await;
        let p = seed_product(&db, "c1", "RACE-01").await;
        service.register_entry("c1", &p.id, 10, 100, None).await.unwrap();

        let s1 = service.clone();
        let s2 = service.clone();
        let id1 = p.id.clone();
        let id2 = p.id.clone();
        let a = tokio::spawn(async move { s1.create_exit("c1", &id1, 7, None).await });
        let b = tokio::spawn(async move { s2.create_exit("c1", &id2, 7, None).await });

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        // Exactly one of the two exits can fit in 10 units.
        assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
        assert_eq!(service.current_stock(&p.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_status_cache_and_invalidation() {
        let (db, service, _) = harness().await;
        let p = seed_product(&db, "c1", "CACHE-01").await;
        service.register_entry("c1", &p.id, 5, 100, None).await.unwrap();

        let first = service.inventory_status("c1").await.unwrap();
        assert_eq!(first[0].current_stock, 5);

        // A direct repository write bypasses the service, so the cached
        // snapshot keeps serving - the documented TTL tradeoff.
        let stale_probe = InventoryMovement {
            id: Uuid::new_v4().to_string(),
            company_id: "c1".into(),
            product_id: p.id.clone(),
            kind: MovementKind::Entry,
            quantity: 99,
            unit_cost_cents: Some(100),
            sale_id: None,
            entry_date: Utc::now(),
            notes: None,
            created_at: Utc::now(),
        };
        db.inventory().insert(db.pool(), &stale_probe).await.unwrap();
        let cached = service.inventory_status("c1").await.unwrap();
        assert_eq!(cached[0].current_stock, 5);

        // A service write invalidates, so the next read is fresh.
        service.register_entry("c1", &p.id, 1, 100, None).await.unwrap();
        let fresh = service.inventory_status("c1").await.unwrap();
        assert_eq!(fresh[0].current_stock, 105);
    }

    #[tokio::test]
    async fn test_stale_products_uses_injected_clock() {
        let (db, service, clock) = harness().await;
        let moved = seed_product(&db, "c1", "MOVED-01").await;
        let idle = seed_product(&db, "c1", "IDLE-01").await;

        service.register_entry("c1", &moved.id, 5, 100, None).await.unwrap();

        // Nothing is stale yet.
        let stale = service.stale_products("c1", STALE_DAYS_DEFAULT).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, idle.id);

        // 91 days later the moved product has aged out too.
        clock.advance(Duration::days(91));
        let stale = service.stale_products("c1", STALE_DAYS_DEFAULT).await.unwrap();
        assert_eq!(stale.len(), 2);
    }
}
