//! # Settlement Pipeline
//!
//! Converts pending sales into committed inventory exits.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Settlement Worker Flow                             │
//! │                                                                         │
//! │  SettlementHandle                                                       │
//! │    ├── submit(sale_id)          → Settle task                           │
//! │    └── enqueue_sale(...)        → CreateAndSettle task + tracking id    │
//! │                │                                                        │
//! │                ▼  (mpsc queue, at-least-once)                           │
//! │  SettlementWorker - one sale at a time, up to 3 attempts each:          │
//! │                                                                         │
//! │    lock products (sorted) {                                             │
//! │        BEGIN                                                            │
//! │        claim: pending → processing   ── 0 rows? already owned/terminal  │
//! │        per line: check stock, write exit referencing the sale           │
//! │        flip: processing → completed, stamp completed_at                 │
//! │        COMMIT                                                           │
//! │    }                                                                    │
//! │                                                                         │
//! │    any error → ROLLBACK (nothing written), then:                        │
//! │      transient (storage/timeout) → retry, re-deriving from the ledger   │
//! │      terminal (insufficient stock, bad product) → mark sale Failed      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The claim, the exits, and the completion flip share one transaction: a
//! crash mid-way leaves the sale exactly as it was, never partially
//! settled. Retries are safe because every attempt re-reads stock from the
//! ledger instead of trusting anything from the failed attempt.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use tally_core::{Clock, CoreError, Sale};
use tally_db::{Database, DbError};

use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryService;
use crate::sales::{SaleRequestItem, SaleService};

// =============================================================================
// Constants
// =============================================================================

/// Maximum attempts per task on transient failure.
pub const MAX_SETTLEMENT_ATTEMPTS: u32 = 3;

/// Timeout budget for a single settlement attempt.
pub const SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Tasks
// =============================================================================

/// Work submitted to the settlement queue.
#[derive(Debug, Clone)]
pub enum SettlementTask {
    /// Settle an already-created pending sale.
    Settle { sale_id: String },

    /// Deferred creation: build the sale, then settle it. The caller
    /// already holds the tracking id for log correlation.
    CreateAndSettle {
        company_id: String,
        items: Vec<SaleRequestItem>,
        notes: Option<String>,
        tracking_id: String,
    },
}

impl SettlementTask {
    fn tracking_id(&self) -> &str {
        match self {
            SettlementTask::Settle { sale_id } => sale_id,
            SettlementTask::CreateAndSettle { tracking_id, .. } => tracking_id,
        }
    }
}

/// What one settlement attempt concluded.
enum SettlementOutcome {
    /// Exits written, sale flipped to Completed.
    Completed,
    /// Someone else already owns or finished the sale; nothing written.
    AlreadyClaimed,
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for submitting work to a running settlement worker.
#[derive(Clone)]
pub struct SettlementHandle {
    task_tx: mpsc::Sender<SettlementTask>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SettlementHandle {
    /// Queues settlement of an existing pending sale.
    pub async fn submit(&self, sale_id: impl Into<String>) -> EngineResult<()> {
        self.task_tx
            .send(SettlementTask::Settle {
                sale_id: sale_id.into(),
            })
            .await
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Queues deferred sale creation + settlement.
    ///
    /// Returns immediately with a tracking id; the caller observes the
    /// eventual outcome by polling the sale's status (the worker logs the
    /// tracking id alongside the sale number it creates).
    pub async fn enqueue_sale(
        &self,
        company_id: &str,
        items: Vec<SaleRequestItem>,
        notes: Option<String>,
    ) -> EngineResult<String> {
        let tracking_id = Uuid::new_v4().to_string();
        self.task_tx
            .send(SettlementTask::CreateAndSettle {
                company_id: company_id.to_string(),
                items,
                notes,
                tracking_id: tracking_id.clone(),
            })
            .await
            .map_err(|_| EngineError::QueueClosed)?;
        Ok(tracking_id)
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::QueueClosed)
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Queue consumer driving sales through the settlement state machine.
pub struct SettlementWorker {
    db: Database,
    sales: SaleService,
    inventory: InventoryService,
    clock: Arc<dyn Clock>,
    task_rx: mpsc::Receiver<SettlementTask>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SettlementWorker {
    /// Creates a worker and its submission handle.
    pub fn new(
        db: Database,
        sales: SaleService,
        inventory: InventoryService,
        clock: Arc<dyn Clock>,
    ) -> (Self, SettlementHandle) {
        let (task_tx, task_rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = SettlementWorker {
            db,
            sales,
            inventory,
            clock,
            task_rx,
            shutdown_rx,
        };
        let handle = SettlementHandle {
            task_tx,
            shutdown_tx,
        };

        (worker, handle)
    }

    /// Runs the settlement loop. Spawn this as a background task.
    pub async fn run(mut self) {
        info!("Settlement worker starting");

        loop {
            tokio::select! {
                task = self.task_rx.recv() => {
                    match task {
                        Some(task) => self.handle_task(task).await,
                        None => break,
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Settlement worker shutting down");
                    break;
                }
            }
        }

        info!("Settlement worker stopped");
    }

    /// Drives one task to a terminal outcome.
    async fn handle_task(&self, task: SettlementTask) {
        let tracking_id = task.tracking_id().to_string();

        // For Settle tasks the sale must already exist.
        let mut sale: Option<Sale> = None;
        if let SettlementTask::Settle { sale_id } = &task {
            match self.db.sales().find_by_id(sale_id).await {
                Ok(Some(s)) => sale = Some(s),
                Ok(None) => {
                    error!(sale_id = %sale_id, "Cannot settle unknown sale");
                    return;
                }
                Err(e) => {
                    error!(sale_id = %sale_id, error = %e, "Failed to load sale for settlement");
                    return;
                }
            }
        }

        for attempt in 1..=MAX_SETTLEMENT_ATTEMPTS {
            let attempt_result = tokio::time::timeout(SETTLEMENT_TIMEOUT, async {
                let current = match &sale {
                    Some(s) => s.clone(),
                    None => match &task {
                        SettlementTask::CreateAndSettle {
                            company_id,
                            items,
                            notes,
                            tracking_id,
                        } => {
                            let created = self
                                .sales
                                .create_sale(company_id, items, notes.clone())
                                .await?;
                            info!(
                                tracking_id = %tracking_id,
                                sale_id = %created.id,
                                sale_number = %created.sale_number,
                                "Deferred sale created"
                            );
                            sale = Some(created.clone());
                            created
                        }
                        // Unreachable: Settle tasks preload the sale. If the
                        // row vanished anyway, surface it as such.
                        SettlementTask::Settle { sale_id } => {
                            return Err(CoreError::SaleNotFound(sale_id.clone()).into());
                        }
                    },
                };
                self.settle(&current).await
            })
            .await
            .unwrap_or(Err(EngineError::Timeout(SETTLEMENT_TIMEOUT)));

            match attempt_result {
                Ok(outcome) => {
                    if let Some(s) = &sale {
                        match outcome {
                            SettlementOutcome::Completed => info!(
                                tracking_id = %tracking_id,
                                sale_id = %s.id,
                                sale_number = %s.sale_number,
                                "Sale settled"
                            ),
                            SettlementOutcome::AlreadyClaimed => info!(
                                tracking_id = %tracking_id,
                                sale_id = %s.id,
                                "Sale already claimed or terminal; nothing to do"
                            ),
                        }
                    }
                    return;
                }
                Err(e) if e.is_transient() && attempt < MAX_SETTLEMENT_ATTEMPTS => {
                    warn!(
                        tracking_id = %tracking_id,
                        attempt,
                        error = %e,
                        "Transient settlement failure, retrying"
                    );
                }
                Err(e) => {
                    self.fail_sale(&tracking_id, sale.as_ref(), &e).await;
                    return;
                }
            }
        }
    }

    /// One settlement attempt: claim, check all stock, write all exits,
    /// complete - a single transaction under the products' advisory locks.
    async fn settle(&self, sale: &Sale) -> EngineResult<SettlementOutcome> {
        let now = self.clock.now();

        // Line items are immutable after creation, so reading them outside
        // the transaction is safe.
        let items = self.db.sales().get_items(&sale.id).await?;
        let product_ids: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();
        let _guards = self.inventory.lock_products(&product_ids).await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        if !self
            .db
            .sales()
            .begin_processing(&mut *tx, &sale.id, now)
            .await?
        {
            // Not Pending: a concurrent settlement owns it, or it already
            // reached Completed/Failed. Terminal states stay terminal.
            return Ok(SettlementOutcome::AlreadyClaimed);
        }

        for item in &items {
            let product = self
                .db
                .products()
                .find_by_id(&mut *tx, &item.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;

            // Raises InsufficientStock naming the product, the required
            // quantity, and what is actually available. Any failure here
            // abandons the transaction - no partial exits survive.
            self.inventory
                .record_exit_in_tx(&mut tx, &product, item.quantity, Some(sale.id.clone()), now)
                .await?;
        }

        self.db.sales().mark_completed(&mut *tx, &sale.id, now).await?;
        tx.commit().await.map_err(DbError::from)?;

        self.inventory.invalidate_status(&sale.company_id);

        Ok(SettlementOutcome::Completed)
    }

    /// Compensation: the settlement transaction has rolled back; record the
    /// terminal failure on the sale (if one exists) and log the diagnostic.
    async fn fail_sale(&self, tracking_id: &str, sale: Option<&Sale>, cause: &EngineError) {
        match sale {
            Some(sale) => {
                error!(
                    tracking_id = %tracking_id,
                    sale_id = %sale.id,
                    sale_number = %sale.sale_number,
                    error = %cause,
                    "Settlement failed; marking sale as failed"
                );
                match self.db.sales().mark_failed(&sale.id, self.clock.now()).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        sale_id = %sale.id,
                        "Sale already terminal; failure mark skipped"
                    ),
                    Err(e) => error!(
                        sale_id = %sale.id,
                        error = %e,
                        "Could not mark sale as failed"
                    ),
                }
            }
            None => {
                // Creation itself failed; the transaction rollback means no
                // sale row exists to carry a Failed status.
                error!(
                    tracking_id = %tracking_id,
                    error = %cause,
                    "Deferred sale creation failed; nothing persisted"
                );
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
