//! # Inventory Repository
//!
//! The append-only stock ledger.
//!
//! ## Ledger Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    inventory_movements                                  │
//! │                                                                         │
//! │  id  | product_id | kind  | quantity | unit_cost_cents | sale_id        │
//! │  ────┼────────────┼───────┼──────────┼─────────────────┼─────────       │
//! │  m1  │ prod-a     │ entry │ 50       │ 10000           │ NULL           │
//! │  m2  │ prod-a     │ entry │ 50       │ 10000           │ NULL           │
//! │  m3  │ prod-a     │ exit  │ 30       │ 10000           │ sale-1         │
//! │                                                                         │
//! │  current_stock(prod-a) = 50 + 50 − 30 = 70                              │
//! │                                                                         │
//! │  Rows are never updated or deleted. Stock is always derived.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `insert` and `current_stock` take an executor so the stock check and the
//! exit write can share one transaction; the non-negative stock invariant is
//! enforced in tally-engine under the product's advisory lock.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use tally_core::{InventoryMovement, InventoryStatusRow, Product};

const MOVEMENT_COLUMNS: &str = "id, company_id, product_id, kind, quantity, \
     unit_cost_cents, sale_id, entry_date, notes, created_at";

/// Repository for the inventory movement ledger.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Appends one movement row.
    ///
    /// Pass an open transaction when the write must be atomic with a stock
    /// check or a sale status flip; pass the pool otherwise.
    pub async fn insert<'e, E>(&self, executor: E, movement: &InventoryMovement) -> DbResult<()>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        debug!(
            product_id = %movement.product_id,
            kind = ?movement.kind,
            quantity = movement.quantity,
            "Appending inventory movement"
        );

        sqlx::query(
            "INSERT INTO inventory_movements ( \
                id, company_id, product_id, kind, quantity, \
                unit_cost_cents, sale_id, entry_date, notes, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&movement.id)
        .bind(&movement.company_id)
        .bind(&movement.product_id)
        .bind(movement.kind)
        .bind(movement.quantity)
        .bind(movement.unit_cost_cents)
        .bind(&movement.sale_id)
        .bind(movement.entry_date)
        .bind(&movement.notes)
        .bind(movement.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Signed sum of a product's movements. 0 for a product with no rows.
    pub async fn current_stock<'e, E>(&self, executor: E, product_id: &str) -> DbResult<i64>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let stock: i64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM( \
                CASE WHEN kind = 'entry' THEN quantity ELSE -quantity END \
             ), 0) AS INTEGER) \
             FROM inventory_movements WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(executor)
        .await?;

        Ok(stock)
    }

    /// Per-product stock, valuation, and projected profit for a company's
    /// active products.
    ///
    /// `total_value_cents` sums gross Entry cost (quantity × unit_cost over
    /// entries only) - it is not adjusted for stock that has since left.
    pub async fn inventory_status(&self, company_id: &str) -> DbResult<Vec<InventoryStatusRow>> {
        let rows = sqlx::query_as::<_, InventoryStatusRow>(
            "SELECT \
                p.id AS product_id, \
                p.sku, \
                p.name, \
                p.cost_cents, \
                p.price_cents, \
                CAST(COALESCE(SUM( \
                    CASE WHEN m.kind = 'entry' THEN m.quantity ELSE -m.quantity END \
                ), 0) AS INTEGER) AS current_stock, \
                CAST(COALESCE(SUM( \
                    CASE WHEN m.kind = 'entry' \
                         THEN m.quantity * COALESCE(m.unit_cost_cents, 0) \
                         ELSE 0 END \
                ), 0) AS INTEGER) AS total_value_cents, \
                CAST(COALESCE(SUM( \
                    CASE WHEN m.kind = 'entry' THEN m.quantity ELSE -m.quantity END \
                ), 0) AS INTEGER) * (p.price_cents - p.cost_cents) \
                    AS projected_profit_cents \
             FROM products p \
             LEFT JOIN inventory_movements m ON m.product_id = p.id \
             WHERE p.company_id = ?1 AND p.is_active = 1 \
             GROUP BY p.id \
             ORDER BY p.sku",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Products with no movement at or after `cutoff` - including products
    /// that have never moved at all.
    pub async fn stale_products(
        &self,
        company_id: &str,
        cutoff: DateTime<Utc>,
    ) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT p.id, p.company_id, p.sku, p.name, p.description, \
                    p.cost_cents, p.price_cents, p.is_active, p.created_at, p.updated_at \
             FROM products p \
             WHERE p.company_id = ?1 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM inventory_movements m \
                   WHERE m.product_id = p.id AND m.entry_date >= ?2 \
               ) \
             ORDER BY p.sku",
        )
        .bind(company_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// A product's movements, most recent first.
    pub async fn for_product(&self, product_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE product_id = ?1 ORDER BY entry_date DESC, created_at DESC"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// A company's movements, most recent first.
    pub async fn for_company(&self, company_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE company_id = ?1 ORDER BY entry_date DESC, created_at DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Exit movements written by settling a sale.
    pub async fn for_sale(&self, sale_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE sale_id = ?1 ORDER BY created_at"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}

/// Helper to generate a new movement ID.
pub fn generate_movement_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
