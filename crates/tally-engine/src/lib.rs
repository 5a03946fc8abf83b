//! # tally-engine: Services and Settlement Pipeline for Tally
//!
//! The service layer over the inventory ledger. This crate owns every
//! transaction boundary and the asynchronous settlement state machine.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     tally-engine (THIS CRATE)                           │
//! │                                                                         │
//! │  ┌───────────────┐  ┌──────────────┐  ┌──────────────────────────────┐ │
//! │  │ InventorySvc  │  │  SaleService │  │  SettlementWorker + Handle   │ │
//! │  │ (inventory)   │  │  (sales)     │  │  (settlement)                │ │
//! │  │               │  │              │  │                              │ │
//! │  │ entries/exits │  │ atomic       │  │ queue consumer:              │ │
//! │  │ stock policy  │  │ create from  │  │ Pending → Processing →       │ │
//! │  │ status cache  │◄─│ pure builder │◄─│ Completed/Failed, retries,   │ │
//! │  │ stale listing │  │              │  │ timeout, compensation        │ │
//! │  └───────┬───────┘  └──────┬───────┘  └──────────────┬───────────────┘ │
//! │          │                 │                         │                 │
//! │  ┌───────┴───────┐  ┌──────┴───────┐  ┌──────────────┴───────────────┐ │
//! │  │ ProductLocks  │  │ StatusCache  │  │  ReportService (report)      │ │
//! │  │ (locks)       │  │ (cache)      │  │  cursor pages + metrics      │ │
//! │  └───────────────┘  └──────────────┘  └──────────────────────────────┘ │
//! │                                                                         │
//! │  DEPENDENCIES:                                                          │
//! │  • tally-core: pure types, money, sale math, injectable clock           │
//! │  • tally-db: repositories + pool (transactions are opened here)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let cache = Arc::new(StatusCache::default());
//! let locks = Arc::new(ProductLocks::new());
//!
//! let inventory = InventoryService::new(db.clone(), clock.clone(), cache, locks);
//! let sales = SaleService::new(db.clone(), clock.clone());
//! let reports = ReportService::new(db.clone());
//!
//! let (worker, settlement) = SettlementWorker::new(db, sales.clone(), inventory.clone(), clock);
//! tokio::spawn(worker.run());
//!
//! // Synchronous path: create now, settle in the background.
//! let sale = sales.create_sale(&company_id, &items, None).await?;
//! settlement.submit(&sale.id).await?;
//!
//! // Asynchronous path: everything deferred, tracking id back immediately.
//! let tracking_id = settlement.enqueue_sale(&company_id, items, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod inventory;
pub mod locks;
pub mod report;
pub mod sales;
pub mod settlement;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{StatusCache, STATUS_CACHE_TTL};
pub use error::{EngineError, EngineResult};
pub use inventory::{InventoryService, STALE_DAYS_DEFAULT};
pub use locks::ProductLocks;
pub use report::{ReportCursor, ReportService, SalesPage, DEFAULT_PAGE_SIZE};
pub use sales::{SaleRequestItem, SaleService};
pub use settlement::{
    SettlementHandle, SettlementTask, SettlementWorker, MAX_SETTLEMENT_ATTEMPTS,
    SETTLEMENT_TIMEOUT,
};
