//! # Sale Repository
//!
//! Database operations for sale headers and line items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (one transaction, owned by SaleService)                      │
//! │     └── insert_sale() → Sale { status: Pending, totals: 0 }             │
//! │     └── insert_item() × N                                               │
//! │     └── update_totals() → recomputed header sums                        │
//! │                                                                         │
//! │  2. SETTLE (one transaction, owned by the settlement worker)            │
//! │     └── begin_processing() → atomically claims the Pending sale         │
//! │     └── (inventory exits written via InventoryRepository)               │
//! │     └── mark_completed() → Sale { status: Completed }                   │
//! │                                                                         │
//! │  3. COMPENSATE (outside the rolled-back transaction)                    │
//! │     └── mark_failed() → Sale { status: Failed }                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The status guards in the UPDATE statements are what make settlement
//! idempotent: a sale observed outside Pending is simply not claimed again.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{Sale, SaleLineItem, SalesMetrics};

const SALE_COLUMNS: &str = "id, company_id, sale_number, total_amount_cents, \
     total_cost_cents, total_profit_cents, status, sale_date, completed_at, \
     notes, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, sale_id, company_id, product_id, quantity, \
     unit_price_cents, unit_cost_cents, subtotal_cents, cost_total_cents, \
     profit_cents, created_at";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Inserts a sale header.
    pub async fn insert_sale<'e, E>(&self, executor: E, sale: &Sale) -> DbResult<()>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        debug!(id = %sale.id, sale_number = %sale.sale_number, "Inserting sale");

        sqlx::query(
            "INSERT INTO sales ( \
                id, company_id, sale_number, \
                total_amount_cents, total_cost_cents, total_profit_cents, \
                status, sale_date, completed_at, notes, created_at, updated_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&sale.id)
        .bind(&sale.company_id)
        .bind(&sale.sale_number)
        .bind(sale.total_amount_cents)
        .bind(sale.total_cost_cents)
        .bind(sale.total_profit_cents)
        .bind(sale.status)
        .bind(sale.sale_date)
        .bind(sale.completed_at)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Inserts a line item.
    ///
    /// ## Snapshot Pattern
    /// Unit price and cost were copied from the product at sale creation;
    /// the row is immutable afterwards.
    pub async fn insert_item<'e, E>(&self, executor: E, item: &SaleLineItem) -> DbResult<()>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        debug!(sale_id = %item.sale_id, product_id = %item.product_id, "Adding sale item");

        sqlx::query(
            "INSERT INTO sale_items ( \
                id, sale_id, company_id, product_id, quantity, \
                unit_price_cents, unit_cost_cents, \
                subtotal_cents, cost_total_cents, profit_cents, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.company_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.unit_cost_cents)
        .bind(item.subtotal_cents)
        .bind(item.cost_total_cents)
        .bind(item.profit_cents)
        .bind(item.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Gets all items for a sale.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleLineItem>> {
        let items = sqlx::query_as::<_, SaleLineItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, id"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Persists recomputed header totals.
    ///
    /// Only Pending sales may have their totals rewritten; totals are frozen
    /// once settlement owns the sale.
    pub async fn update_totals<'e, E>(
        &self,
        executor: E,
        sale_id: &str,
        total_amount_cents: i64,
        total_cost_cents: i64,
        total_profit_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE sales SET \
                total_amount_cents = ?2, \
                total_cost_cents = ?3, \
                total_profit_cents = ?4, \
                updated_at = ?5 \
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(sale_id)
        .bind(total_amount_cents)
        .bind(total_cost_cents)
        .bind(total_profit_cents)
        .bind(now)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (pending)", sale_id));
        }

        Ok(())
    }

    /// Atomically claims a Pending sale for settlement.
    ///
    /// ## Returns
    /// * `true` - this caller now owns the sale (flipped to Processing)
    /// * `false` - the sale was not Pending: another settlement owns it or
    ///   it already reached a terminal state; the caller must not settle
    pub async fn begin_processing<'e, E>(
        &self,
        executor: E,
        sale_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE sales SET status = 'processing', updated_at = ?2 \
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(sale_id)
        .bind(now)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Completes a Processing sale, stamping `completed_at`.
    pub async fn mark_completed<'e, E>(
        &self,
        executor: E,
        sale_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE sales SET status = 'completed', completed_at = ?2, updated_at = ?2 \
             WHERE id = ?1 AND status = 'processing'",
        )
        .bind(sale_id)
        .bind(now)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (processing)", sale_id));
        }

        Ok(())
    }

    /// Marks a sale Failed.
    ///
    /// Runs on the pool, outside the rolled-back settlement transaction.
    /// Terminal states are never overwritten; returns whether a row flipped.
    pub async fn mark_failed(&self, sale_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sales SET status = 'failed', updated_at = ?2 \
             WHERE id = ?1 AND status IN ('pending', 'processing')",
        )
        .bind(sale_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// One keyset page of completed sales for the report.
    ///
    /// Ordered by `(sale_date DESC, id DESC)`; `after` is the last-seen pair
    /// from the previous page and restricts to strictly older rows. The
    /// optional SKU filter keeps sales containing at least one line item
    /// whose product carries that SKU.
    pub async fn report_page(
        &self,
        company_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sku: Option<&str>,
        after: Option<(DateTime<Utc>, String)>,
        limit: u32,
    ) -> DbResult<Vec<Sale>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE company_id = "));
        qb.push_bind(company_id);
        qb.push(" AND status = 'completed' AND sale_date BETWEEN ");
        qb.push_bind(start);
        qb.push(" AND ");
        qb.push_bind(end);

        if let Some(sku) = sku {
            qb.push(
                " AND EXISTS ( \
                    SELECT 1 FROM sale_items si \
                    JOIN products p ON p.id = si.product_id \
                    WHERE si.sale_id = sales.id AND p.company_id = ",
            );
            qb.push_bind(company_id);
            qb.push(" AND p.sku = ");
            qb.push_bind(sku);
            qb.push(")");
        }

        if let Some((after_date, after_id)) = after {
            qb.push(" AND (sale_date < ");
            qb.push_bind(after_date);
            qb.push(" OR (sale_date = ");
            qb.push_bind(after_date);
            qb.push(" AND id < ");
            qb.push_bind(after_id);
            qb.push("))");
        }

        qb.push(" ORDER BY sale_date DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(limit));

        let sales = qb
            .build_query_as::<Sale>()
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
    }

    /// Aggregate metrics over the same filter set as [`Self::report_page`].
    ///
    /// With a SKU filter, `total_quantity` sums only the matching SKU's line
    /// quantities while amount/profit still sum whole sale headers. That
    /// asymmetry is part of the report contract, not an oversight to fix.
    pub async fn metrics(
        &self,
        company_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sku: Option<&str>,
    ) -> DbResult<SalesMetrics> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT \
                COUNT(*) AS total_sales, \
                CAST(COALESCE(SUM(total_amount_cents), 0) AS INTEGER) AS total_amount_cents, \
                CAST(COALESCE(SUM(total_profit_cents), 0) AS INTEGER) AS total_profit_cents, \
                CAST(COALESCE(SUM(( \
                    SELECT SUM(si.quantity) FROM sale_items si ",
        );

        if sku.is_some() {
            qb.push("JOIN products p ON p.id = si.product_id ");
        }
        qb.push("WHERE si.sale_id = sales.id");
        if let Some(sku) = sku {
            qb.push(" AND p.company_id = ");
            qb.push_bind(company_id);
            qb.push(" AND p.sku = ");
            qb.push_bind(sku);
        }

        qb.push(
            ")), 0) AS INTEGER) AS total_quantity \
             FROM sales WHERE company_id = ",
        );
        qb.push_bind(company_id);
        qb.push(" AND status = 'completed' AND sale_date BETWEEN ");
        qb.push_bind(start);
        qb.push(" AND ");
        qb.push_bind(end);

        if let Some(sku) = sku {
            qb.push(
                " AND EXISTS ( \
                    SELECT 1 FROM sale_items si \
                    JOIN products p ON p.id = si.product_id \
                    WHERE si.sale_id = sales.id AND p.company_id = ",
            );
            qb.push_bind(company_id);
            qb.push(" AND p.sku = ");
            qb.push_bind(sku);
            qb.push(")");
        }

        let metrics = qb
            .build_query_as::<SalesMetrics>()
            .fetch_one(&self.pool)
            .await?;

        Ok(metrics)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::generate_product_id;
    use chrono::TimeZone;
    use tally_core::{Product, SaleStatus};
    use uuid::Uuid;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, d, 12, 0, 0).unwrap()
    }

    fn sale(company_id: &str, date: DateTime<Utc>, amount: i64, profit: i64) -> Sale {
        Sale {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            sale_number: "SALE-20260401-00001".to_string(),
            total_amount_cents: amount,
            total_cost_cents: amount - profit,
            total_profit_cents: profit,
            status: SaleStatus::Pending,
            sale_date: date,
            completed_at: None,
            notes: None,
            created_at: date,
            updated_at: date,
        }
    }

    fn item(sale: &Sale, product_id: &str, quantity: i64) -> SaleLineItem {
        SaleLineItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale.id.clone(),
            company_id: sale.company_id.clone(),
            product_id: product_id.to_string(),
            quantity,
            unit_price_cents: 15000,
            unit_cost_cents: 10000,
            subtotal_cents: quantity * 15000,
            cost_total_cents: quantity * 10000,
            profit_cents: quantity * 5000,
            created_at: sale.sale_date,
        }
    }

    fn product(company_id: &str, sku: &str) -> Product {
        let now = Utc::now();
        Product {
            id: generate_product_id(),
            company_id: company_id.to_string(),
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            description: None,
            cost_cents: 10000,
            price_cents: 15000,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts a completed sale with the given line quantities.
    async fn completed_sale(
        db: &Database,
        date: DateTime<Utc>,
        amount: i64,
        profit: i64,
        lines: &[(&Product, i64)],
    ) -> Sale {
        let repo = db.sales();
        let s = sale("c1", date, amount, profit);
        repo.insert_sale(db.pool(), &s).await.unwrap();
        for (p, qty) in lines {
            repo.insert_item(db.pool(), &item(&s, &p.id, *qty)).await.unwrap();
        }
        assert!(repo.begin_processing(db.pool(), &s.id, date).await.unwrap());
        repo.mark_completed(db.pool(), &s.id, date).await.unwrap();
        repo.find_by_id(&s.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let p1 = product("c1", "RT-01");
        let p2 = product("c1", "RT-02");
        db.products().insert(&p1).await.unwrap();
        db.products().insert(&p2).await.unwrap();

        let s = sale("c1", day(1), 60000, 20000);
        repo.insert_sale(db.pool(), &s).await.unwrap();
        repo.insert_item(db.pool(), &item(&s, &p1.id, 2)).await.unwrap();
        repo.insert_item(db.pool(), &item(&s, &p2.id, 1)).await.unwrap();

        let found = repo.find_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(found.status, SaleStatus::Pending);
        assert_eq!(found.total_amount_cents, 60000);
        assert!(found.completed_at.is_none());

        let items = repo.get_items(&s.id).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_begin_processing_claims_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let s = sale("c1", day(1), 100, 10);
        repo.insert_sale(db.pool(), &s).await.unwrap();

        assert!(repo.begin_processing(db.pool(), &s.id, day(1)).await.unwrap());
        // Second claim loses: the sale is no longer Pending.
        assert!(!repo.begin_processing(db.pool(), &s.id, day(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_completed_requires_processing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let s = sale("c1", day(1), 100, 10);
        repo.insert_sale(db.pool(), &s).await.unwrap();

        let err = repo.mark_completed(db.pool(), &s.id, day(2)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        assert!(repo.begin_processing(db.pool(), &s.id, day(1)).await.unwrap());
        repo.mark_completed(db.pool(), &s.id, day(2)).await.unwrap();

        let found = repo.find_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(found.status, SaleStatus::Completed);
        assert_eq!(found.completed_at, Some(day(2)));
    }

    #[tokio::test]
    async fn test_mark_failed_never_downgrades_completed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let s = sale("c1", day(1), 100, 10);
        repo.insert_sale(db.pool(), &s).await.unwrap();
        assert!(repo.begin_processing(db.pool(), &s.id, day(1)).await.unwrap());
        repo.mark_completed(db.pool(), &s.id, day(1)).await.unwrap();

        assert!(!repo.mark_failed(&s.id, day(2)).await.unwrap());
        let found = repo.find_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(found.status, SaleStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_totals_frozen_after_claim() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let s = sale("c1", day(1), 0, 0);
        repo.insert_sale(db.pool(), &s).await.unwrap();
        repo.update_totals(db.pool(), &s.id, 500, 300, 200, day(1))
            .await
            .unwrap();

        assert!(repo.begin_processing(db.pool(), &s.id, day(1)).await.unwrap());
        let err = repo
            .update_totals(db.pool(), &s.id, 1, 1, 0, day(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_report_page_order_and_cursor_walk() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let p = product("c1", "WALK-01");
        db.products().insert(&p).await.unwrap();

        for d in [1, 2, 3] {
            completed_sale(&db, day(d), 100 * d as i64, 10, &[(&p, 1)]).await;
        }
        // A pending sale in-window must never appear.
        let pending = sale("c1", day(2), 999, 99);
        repo.insert_sale(db.pool(), &pending).await.unwrap();

        let mut seen: Vec<DateTime<Utc>> = Vec::new();
        let mut after: Option<(DateTime<Utc>, String)> = None;
        loop {
            let page = repo
                .report_page("c1", day(1), day(30), None, after.clone(), 1)
                .await
                .unwrap();
            if page.is_empty() {
                break;
            }
            assert_eq!(page.len(), 1);
            let s = &page[0];
            seen.push(s.sale_date);
            after = Some((s.sale_date, s.id.clone()));
        }

        assert_eq!(seen, vec![day(3), day(2), day(1)]);
    }

    #[tokio::test]
    async fn test_report_page_tiebreak_same_date() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let p = product("c1", "TIE-01");
        db.products().insert(&p).await.unwrap();

        let a = completed_sale(&db, day(5), 100, 10, &[(&p, 1)]).await;
        let b = completed_sale(&db, day(5), 200, 20, &[(&p, 1)]).await;

        let first = repo
            .report_page("c1", day(1), day(30), None, None, 1)
            .await
            .unwrap();
        let second = repo
            .report_page(
                "c1",
                day(1),
                day(30),
                None,
                Some((first[0].sale_date, first[0].id.clone())),
                1,
            )
            .await
            .unwrap();

        let mut ids = vec![first[0].id.clone(), second[0].id.clone()];
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
        // Strictly descending by id on the tied date.
        assert!(first[0].id > second[0].id);
    }

    #[tokio::test]
    async fn test_metrics_over_window() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let p = product("c1", "MET-01");
        db.products().insert(&p).await.unwrap();

        // 300.00 / 100.00 profit with quantity 2, 450.00 / 150.00 with 3.
        completed_sale(&db, day(10), 30000, 10000, &[(&p, 2)]).await;
        completed_sale(&db, day(11), 45000, 15000, &[(&p, 3)]).await;
        // Outside the window.
        completed_sale(&db, day(25), 99900, 100, &[(&p, 9)]).await;

        let m = repo.metrics("c1", day(1), day(15), None).await.unwrap();
        assert_eq!(
            m,
            SalesMetrics {
                total_sales: 2,
                total_amount_cents: 75000,
                total_profit_cents: 25000,
                total_quantity: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_metrics_empty_window_is_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let m = db
            .sales()
            .metrics("c1", day(1), day(2), None)
            .await
            .unwrap();
        assert_eq!(m, SalesMetrics::default());
    }

    #[tokio::test]
    async fn test_metrics_sku_filter_asymmetry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let widget = product("c1", "WIDGET-01");
        let gadget = product("c1", "GADGET-01");
        db.products().insert(&widget).await.unwrap();
        db.products().insert(&gadget).await.unwrap();

        // A mixed sale: 2 widgets + 4 gadgets. Amount/profit cover the whole
        // sale, but the widget filter must count only the widget quantity.
        completed_sale(&db, day(10), 90000, 30000, &[(&widget, 2), (&gadget, 4)]).await;
        // A gadget-only sale, excluded entirely by the widget filter.
        completed_sale(&db, day(11), 45000, 15000, &[(&gadget, 3)]).await;

        let m = repo
            .metrics("c1", day(1), day(15), Some("WIDGET-01"))
            .await
            .unwrap();
        assert_eq!(m.total_sales, 1);
        assert_eq!(m.total_amount_cents, 90000); // whole mixed sale
        assert_eq!(m.total_profit_cents, 30000);
        assert_eq!(m.total_quantity, 2); // widget lines only

        let unfiltered = repo.metrics("c1", day(1), day(15), None).await.unwrap();
        assert_eq!(unfiltered.total_sales, 2);
        assert_eq!(unfiltered.total_quantity, 9);
    }

    #[tokio::test]
    async fn test_report_sku_filter_selects_containing_sales() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let widget = product("c1", "WIDGET-01");
        let gadget = product("c1", "GADGET-01");
        db.products().insert(&widget).await.unwrap();
        db.products().insert(&gadget).await.unwrap();

        let mixed = completed_sale(&db, day(10), 1000, 100, &[(&widget, 1), (&gadget, 1)]).await;
        completed_sale(&db, day(11), 2000, 200, &[(&gadget, 2)]).await;

        let page = repo
            .report_page("c1", day(1), day(30), Some("WIDGET-01"), None, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, mixed.id);
    }
}
