//! # Sale Service
//!
//! Atomic sale creation plus lookups.
//!
//! The financial math lives in `tally_core::sale_builder`; this service
//! owns the transaction: validate every product, insert the Pending header,
//! insert the line items, persist the recomputed totals - all or nothing.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::info;

use tally_core::{build_sale, Clock, CoreError, Sale, SaleLineItem};
use tally_db::{Database, DbError};

use crate::error::EngineResult;

/// One requested line of a sale: which product, how many units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRequestItem {
    pub product_id: String,
    pub quantity: i64,
}

/// Service for creating and reading sales.
#[derive(Clone)]
pub struct SaleService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SaleService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        SaleService { db, clock }
    }

    /// Creates a Pending sale with computed financial splits.
    ///
    /// ## What This Does
    /// 1. Resolves and validates every requested product (fail fast,
    ///    before any write, naming the offending product)
    /// 2. Inserts the header with status Pending and zero totals
    /// 3. Inserts one line item per request, with price/cost snapshots
    /// 4. Persists the header totals as the sum of the line items
    ///
    /// All inside one transaction: either the sale and all its items exist
    /// with consistent totals, or none of it exists.
    pub async fn create_sale(
        &self,
        company_id: &str,
        items: &[SaleRequestItem],
        notes: Option<String>,
    ) -> EngineResult<Sale> {
        let now = self.clock.now();
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let mut cart = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .db
                .products()
                .find_by_id(&mut *tx, &item.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;
            cart.push((product, item.quantity));
        }

        // Ownership, quantity, and money checks plus all the line math.
        let draft = build_sale(company_id, &cart, notes, now)?;

        let sales = self.db.sales();

        let mut header = draft.sale.clone();
        header.total_amount_cents = 0;
        header.total_cost_cents = 0;
        header.total_profit_cents = 0;
        sales.insert_sale(&mut *tx, &header).await?;

        for line in &draft.items {
            sales.insert_item(&mut *tx, line).await?;
        }

        sales
            .update_totals(
                &mut *tx,
                &draft.sale.id,
                draft.sale.total_amount_cents,
                draft.sale.total_cost_cents,
                draft.sale.total_profit_cents,
                now,
            )
            .await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %draft.sale.id,
            sale_number = %draft.sale.sale_number,
            company_id,
            total_amount = %draft.sale.total_amount(),
            items = draft.items.len(),
            "Sale created"
        );

        Ok(draft.sale)
    }

    /// Gets a sale header by id.
    pub async fn get_sale(&self, id: &str) -> EngineResult<Option<Sale>> {
        Ok(self.db.sales().find_by_id(id).await?)
    }

    /// Gets a sale with its line items.
    pub async fn get_sale_with_items(
        &self,
        id: &str,
    ) -> EngineResult<Option<(Sale, Vec<SaleLineItem>)>> {
        let Some(sale) = self.db.sales().find_by_id(id).await? else {
            return Ok(None);
        };
        let items = self.db.sales().get_items(id).await?;
        Ok(Some((sale, items)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
