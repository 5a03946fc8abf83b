//! # Domain Types
//!
//! Core domain types for the Tally inventory ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Product      │   │      Sale       │   │ InventoryMovement   │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)          │   │
//! │  │  sku (business) │   │  sale_number    │   │  kind (entry/exit)  │   │
//! │  │  cost_cents     │   │  status         │   │  quantity (>0)      │   │
//! │  │  price_cents    │   │  total_*_cents  │   │  sale_id (exit ref) │   │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────────┘   │
//! │                                 │                                       │
//! │                        ┌────────┴────────┐                              │
//! │                        │  SaleLineItem   │  price/cost snapshots,       │
//! │                        │                 │  per-line profit split       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity carries `company_id` as the tenancy partition key; the core
//! never mixes rows across companies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in a company's catalog.
///
/// Read-only to the ledger core: catalog management (creation, price edits,
/// activation toggling) happens outside. Prices are snapshotted into sale
/// line items at sale-creation time, so later edits never rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Company this product belongs to.
    pub company_id: String,

    /// Stock Keeping Unit - business identifier, unique per company.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Acquisition cost in cents.
    pub cost_cents: i64,

    /// Sale price in cents.
    pub price_cents: i64,

    /// Whether the product is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the acquisition cost as Money.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Returns the sale price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Margin earned per unit sold at current prices.
    #[inline]
    pub fn unit_margin(&self) -> Money {
        self.price() - self.cost()
    }
}

// =============================================================================
// Inventory Movement
// =============================================================================

/// The direction of an inventory movement.
///
/// Sign is carried here, never by the stored quantity: an `Entry` adds
/// stock, an `Exit` removes it, and `quantity` is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock received into inventory.
    Entry,
    /// Stock leaving inventory (usually through a settled sale).
    Exit,
}

impl MovementKind {
    /// Applies this kind's sign to a quantity.
    #[inline]
    pub const fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementKind::Entry => quantity,
            MovementKind::Exit => -quantity,
        }
    }
}

/// One row in the append-only stock ledger.
///
/// Never updated or deleted by the core. Current stock for a product is the
/// signed sum of its movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: String,
    pub company_id: String,
    pub product_id: String,
    pub kind: MovementKind,
    /// Units moved. Always positive; direction comes from `kind`.
    pub quantity: i64,
    /// Cost per unit at movement time. Nullable only for historical rows.
    pub unit_cost_cents: Option<i64>,
    /// Back-reference to the sale that caused this exit, if any.
    pub sale_id: Option<String>,
    /// Logical event time of the movement.
    pub entry_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// The signed stock delta this movement contributes.
    #[inline]
    pub fn stock_delta(&self) -> i64 {
        self.kind.signed(self.quantity)
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The settlement state of a sale.
///
/// ```text
/// Pending ──► Processing ──► Completed
///                  │
///                  └────────► Failed
/// ```
///
/// `Completed` and `Failed` are terminal for a given sale instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Created, waiting for settlement.
    Pending,
    /// A settlement attempt owns this sale.
    Processing,
    /// Settled: every line item has a matching inventory exit.
    Completed,
    /// Settlement failed; the record persists for inspection.
    Failed,
}

impl SaleStatus {
    /// Terminal states are never left again.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::Failed)
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale header. Totals are derived sums of its line items.
///
/// Status transitions after creation are owned exclusively by the
/// settlement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub company_id: String,
    /// Externally visible number, `SALE-<YYYYMMDD>-<5 digits>`.
    /// Best-effort unique per company per day; not enforced.
    pub sale_number: String,
    pub total_amount_cents: i64,
    pub total_cost_cents: i64,
    pub total_profit_cents: i64,
    pub status: SaleStatus,
    /// Business event time, set at creation.
    pub sale_date: DateTime<Utc>,
    /// Set only on the transition to Completed.
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }

    #[inline]
    pub fn total_cost(&self) -> Money {
        Money::from_cents(self.total_cost_cents)
    }

    #[inline]
    pub fn total_profit(&self) -> Money {
        Money::from_cents(self.total_profit_cents)
    }
}

// =============================================================================
// Sale Line Item
// =============================================================================

/// A line item in a sale.
///
/// Uses the snapshot pattern: `unit_price_cents` and `unit_cost_cents` are
/// frozen from the product at sale-creation time. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLineItem {
    pub id: String,
    pub sale_id: String,
    pub company_id: String,
    pub product_id: String,
    /// Units sold. Always positive.
    pub quantity: i64,
    /// Sale price per unit at sale time (frozen).
    pub unit_price_cents: i64,
    /// Cost per unit at sale time (frozen).
    pub unit_cost_cents: i64,
    /// quantity × unit_price.
    pub subtotal_cents: i64,
    /// quantity × unit_cost.
    pub cost_total_cents: i64,
    /// subtotal − cost_total.
    pub profit_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleLineItem {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn cost_total(&self) -> Money {
        Money::from_cents(self.cost_total_cents)
    }

    #[inline]
    pub fn profit(&self) -> Money {
        Money::from_cents(self.profit_cents)
    }
}

// =============================================================================
// Reporting Rows
// =============================================================================

/// One row of a company's inventory status listing.
///
/// `total_value_cents` sums gross Entry cost (quantity × unit_cost over
/// entries only); it is not FIFO-adjusted for what has since left.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryStatusRow {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub current_stock: i64,
    pub total_value_cents: i64,
    /// current_stock × (price − cost) at current catalog prices.
    pub projected_profit_cents: i64,
}

/// Aggregate metrics over a sales-report window.
///
/// With a SKU filter, `total_quantity` counts only the matching SKU's line
/// quantities while `total_amount_cents` / `total_profit_cents` still sum
/// whole sale headers. The asymmetry is deliberate and preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SalesMetrics {
    pub total_sales: i64,
    pub total_amount_cents: i64,
    pub total_profit_cents: i64,
    pub total_quantity: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
