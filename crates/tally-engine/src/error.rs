//! # Engine Error Types
//!
//! One error type for the service layer, merging domain and storage
//! failures and adding the pipeline's own failure modes.
//!
//! The settlement retry policy hangs off [`EngineError::is_transient`]:
//! storage hiccups and timeouts are worth another attempt, business rule
//! violations are not.

use std::time::Duration;
use thiserror::Error;

use tally_core::CoreError;
use tally_db::DbError;

/// Errors surfaced by the Tally service layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business rule violation from tally-core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failure from tally-db.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A settlement attempt exceeded its timeout budget.
    #[error("Settlement attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The settlement queue has shut down; no more tasks are accepted.
    #[error("Settlement queue is closed")]
    QueueClosed,

    /// A report cursor that did not come from this engine.
    #[error("Invalid report cursor: {0}")]
    InvalidCursor(String),
}

impl EngineError {
    /// Whether a retry may plausibly succeed.
    ///
    /// Storage failures and timeouts are transient; domain errors
    /// (insufficient stock, unknown products) will fail the same way
    /// every time and go straight to compensation.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Db(_) | EngineError::Timeout(_))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
