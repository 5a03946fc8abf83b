//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                          │
//! │  └── CoreError       - Business rule violations                         │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                       │
//! │  └── DbError         - Database operation failures                      │
//! │                                                                         │
//! │  tally-engine errors (separate crate)                                   │
//! │  └── EngineError     - Core + Db + timeout/queue failures               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, product id, quantities)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the ledger core.
///
/// All variants are recoverable by the caller, except `InsufficientStock`
/// encountered during settlement, which is terminal for that attempt and
/// drives the sale to Failed.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product id does not resolve to a catalog row.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but belongs to a different company.
    ///
    /// Raised before any write; tenancy is never crossed silently.
    #[error("Product {product_id} does not belong to company {company_id}")]
    ProductCompanyMismatch {
        product_id: String,
        company_id: String,
    },

    /// An exit would drive stock negative.
    ///
    /// Carries everything a caller (or the settlement diagnostic) needs:
    /// the offending SKU, how much was requested, and how much is there.
    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: i64,
        available: i64,
    },

    /// Quantity must be strictly positive.
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// Monetary amounts fed into the ledger cannot be negative.
    #[error("Amount must not be negative, got {0} cents")]
    InvalidMoney(i64),

    /// Sale id does not resolve to a sale row.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
