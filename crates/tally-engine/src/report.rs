//! # Reporting Aggregator
//!
//! Cursor-paged sales report and windowed metrics over completed sales.
//!
//! ## Cursor Pagination
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Rows are ordered by (sale_date DESC, id DESC) - a total order, so      │
//! │  the cursor is just the last-seen pair:                                 │
//! │                                                                         │
//! │   page 1: [ (Apr 03, s9), (Apr 03, s4) ]  cursor = "Apr 03|s4"          │
//! │   page 2: [ (Apr 02, s7), (Apr 01, s2) ]  cursor = "Apr 01|s2"          │
//! │   page 3: [ ]                             done                          │
//! │                                                                         │
//! │  Following a cursor returns strictly older rows by that order, so       │
//! │  concurrent inserts can never shift rows between pages.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cursor token is opaque to callers; they hand it back verbatim.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Sale, SalesMetrics};
use tally_db::Database;

use crate::error::{EngineError, EngineResult};

/// Page size used when the caller passes 0.
pub const DEFAULT_PAGE_SIZE: u32 = 15;

// =============================================================================
// Cursor
// =============================================================================

/// Position marker: the (sale_date, id) pair of the last row served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCursor {
    pub sale_date: DateTime<Utc>,
    pub id: String,
}

impl ReportCursor {
    /// Encodes the cursor as an opaque token.
    ///
    /// Nanosecond precision matters: the token must round-trip to exactly
    /// the stored timestamp or the tie-break comparison misses rows.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}",
            self.sale_date.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.id
        )
    }

    /// Decodes a token produced by [`Self::encode`].
    pub fn decode(token: &str) -> EngineResult<Self> {
        let (date, id) = token
            .split_once('|')
            .ok_or_else(|| EngineError::InvalidCursor(token.to_string()))?;

        if id.is_empty() {
            return Err(EngineError::InvalidCursor(token.to_string()));
        }

        let sale_date = DateTime::parse_from_rfc3339(date)
            .map_err(|_| EngineError::InvalidCursor(token.to_string()))?
            .with_timezone(&Utc);

        Ok(ReportCursor {
            sale_date,
            id: id.to_string(),
        })
    }
}

/// One page of the sales report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesPage {
    pub sales: Vec<Sale>,
    /// Token for the next (strictly older) page; `None` when this page was
    /// short, i.e. the listing is exhausted.
    pub next_cursor: Option<String>,
    pub per_page: u32,
}

// =============================================================================
// Service
// =============================================================================

/// Read-side service over completed sales.
#[derive(Clone)]
pub struct ReportService {
    db: Database,
}

impl ReportService {
    pub fn new(db: Database) -> Self {
        ReportService { db }
    }

    /// One page of completed sales in `[start, end]`, newest first,
    /// optionally restricted to sales containing the given SKU.
    ///
    /// ## Arguments
    /// * `per_page` - page size; 0 means [`DEFAULT_PAGE_SIZE`]
    /// * `cursor` - token from the previous page's `next_cursor`
    pub async fn sales_report(
        &self,
        company_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sku: Option<&str>,
        per_page: u32,
        cursor: Option<&str>,
    ) -> EngineResult<SalesPage> {
        let per_page = if per_page == 0 { DEFAULT_PAGE_SIZE } else { per_page };

        let after = match cursor {
            Some(token) => {
                let c = ReportCursor::decode(token)?;
                Some((c.sale_date, c.id))
            }
            None => None,
        };

        let sales = self
            .db
            .sales()
            .report_page(company_id, start, end, sku, after, per_page)
            .await?;

        let next_cursor = if sales.len() == per_page as usize {
            sales.last().map(|s| {
                ReportCursor {
                    sale_date: s.sale_date,
                    id: s.id.clone(),
                }
                .encode()
            })
        } else {
            None
        };

        Ok(SalesPage {
            sales,
            next_cursor,
            per_page,
        })
    }

    /// Aggregate metrics over the same filter set as the report.
    ///
    /// When filtered by SKU, `total_quantity` counts only that SKU's line
    /// quantities while amount/profit still reflect whole sales.
    pub async fn sales_metrics(
        &self,
        company_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sku: Option<&str>,
    ) -> EngineResult<SalesMetrics> {
        Ok(self.db.sales().metrics(company_id, start, end, sku).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
