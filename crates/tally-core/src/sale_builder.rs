//! # Sale Aggregate Builder
//!
//! Pure construction of a sale header plus line items from a cart of
//! (product, quantity) pairs.
//!
//! ## Financial Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Per line:   subtotal   = quantity × unit_price  (price snapshot)       │
//! │              cost_total = quantity × unit_cost   (cost snapshot)        │
//! │              profit     = subtotal − cost_total                         │
//! │                                                                         │
//! │  Header:     total_amount = Σ subtotal                                  │
//! │              total_cost   = Σ cost_total                                │
//! │              total_profit = total_amount − total_cost                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Prices are snapshotted from the product at build time; later catalog
//! edits never retroactively change a recorded sale. All arithmetic is
//! integer cents - the totals invariant holds exactly.
//!
//! The builder is pure: persistence and transaction boundaries live in
//! tally-engine. Validation here is the write-free half (ownership and
//! quantity checks); existence checks happen at lookup time in the service.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Product, Sale, SaleLineItem, SaleStatus};

/// A sale header and its line items, built but not yet persisted.
#[derive(Debug, Clone)]
pub struct SaleDraft {
    pub sale: Sale,
    pub items: Vec<SaleLineItem>,
}

/// Builds a pending sale from validated (product, quantity) pairs.
///
/// ## Arguments
/// * `company_id` - Owning company; every product must belong to it
/// * `cart` - Products with the quantity requested for each
/// * `notes` - Free-form note carried on the header
/// * `now` - Sale date (injected clock reading)
///
/// ## Errors
/// * `InvalidQuantity` - any quantity ≤ 0
/// * `ProductCompanyMismatch` - a product owned by a different company,
///   identifying the offending product id
/// * `InvalidMoney` - a product carrying a negative price or cost
pub fn build_sale(
    company_id: &str,
    cart: &[(Product, i64)],
    notes: Option<String>,
    now: DateTime<Utc>,
) -> CoreResult<SaleDraft> {
    for (product, quantity) in cart {
        if *quantity <= 0 {
            return Err(CoreError::InvalidQuantity(*quantity));
        }
        if product.company_id != company_id {
            return Err(CoreError::ProductCompanyMismatch {
                product_id: product.id.clone(),
                company_id: company_id.to_string(),
            });
        }
        if product.price_cents < 0 {
            return Err(CoreError::InvalidMoney(product.price_cents));
        }
        if product.cost_cents < 0 {
            return Err(CoreError::InvalidMoney(product.cost_cents));
        }
    }

    let sale_id = Uuid::new_v4().to_string();

    let items: Vec<SaleLineItem> = cart
        .iter()
        .map(|(product, quantity)| {
            let subtotal = product.price().multiply_quantity(*quantity);
            let cost_total = product.cost().multiply_quantity(*quantity);
            SaleLineItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                company_id: company_id.to_string(),
                product_id: product.id.clone(),
                quantity: *quantity,
                unit_price_cents: product.price_cents,
                unit_cost_cents: product.cost_cents,
                subtotal_cents: subtotal.cents(),
                cost_total_cents: cost_total.cents(),
                profit_cents: (subtotal - cost_total).cents(),
                created_at: now,
            }
        })
        .collect();

    let total_amount: Money = items.iter().map(SaleLineItem::subtotal).sum();
    let total_cost: Money = items.iter().map(SaleLineItem::cost_total).sum();

    let sale = Sale {
        id: sale_id,
        company_id: company_id.to_string(),
        sale_number: generate_sale_number(now),
        total_amount_cents: total_amount.cents(),
        total_cost_cents: total_cost.cents(),
        total_profit_cents: (total_amount - total_cost).cents(),
        status: SaleStatus::Pending,
        sale_date: now,
        completed_at: None,
        notes,
        created_at: now,
        updated_at: now,
    };

    Ok(SaleDraft { sale, items })
}

/// Generates a sale number in format: SALE-YYYYMMDD-NNNNN
///
/// ## Format
/// - YYYYMMDD: sale date
/// - NNNNN: 5-digit sequence (padded)
///
/// Uniqueness is best-effort, not enforced; the UUID id is the real key.
pub fn generate_sale_number(now: DateTime<Utc>) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seq = nanos % 100_000;

    format!("SALE-{}-{:05}", now.format("%Y%m%d"), seq)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn product(id: &str, company: &str, cost: i64, price: i64) -> Product {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        Product {
            id: id.to_string(),
            company_id: company.to_string(),
            sku: format!("SKU-{id}"),
            name: format!("Product {id}"),
            description: None,
            cost_cents: cost,
            price_cents: price,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_two_line_totals() {
        // item1: qty=2 @ 150.00/100.00, item2: qty=1 @ 300.00/200.00
        let cart = vec![
            (product("a", "c1", 10000, 15000), 2),
            (product("b", "c1", 20000, 30000), 1),
        ];
        let draft = build_sale("c1", &cart, None, at()).unwrap();

        assert_eq!(draft.sale.total_amount_cents, 60000);
        assert_eq!(draft.sale.total_cost_cents, 40000);
        assert_eq!(draft.sale.total_profit_cents, 20000);
        assert_eq!(draft.sale.status, SaleStatus::Pending);
        assert_eq!(draft.items.len(), 2);
    }

    #[test]
    fn test_totals_equal_item_sums() {
        let cart = vec![
            (product("a", "c1", 999, 1499), 3),
            (product("b", "c1", 50, 75), 7),
            (product("c", "c1", 120000, 99000), 1), // sold below cost
        ];
        let draft = build_sale("c1", &cart, None, at()).unwrap();

        let amount: i64 = draft.items.iter().map(|i| i.subtotal_cents).sum();
        let cost: i64 = draft.items.iter().map(|i| i.cost_total_cents).sum();
        assert_eq!(draft.sale.total_amount_cents, amount);
        assert_eq!(draft.sale.total_cost_cents, cost);
        assert_eq!(draft.sale.total_profit_cents, amount - cost);

        for item in &draft.items {
            assert_eq!(item.subtotal_cents, item.quantity * item.unit_price_cents);
            assert_eq!(item.cost_total_cents, item.quantity * item.unit_cost_cents);
            assert_eq!(item.profit_cents, item.subtotal_cents - item.cost_total_cents);
        }
    }

    #[test]
    fn test_price_snapshot() {
        let mut p = product("a", "c1", 10000, 15000);
        let draft = build_sale("c1", &[(p.clone(), 2)], None, at()).unwrap();

        // A later catalog price edit must not affect the built line.
        p.price_cents = 99999;
        assert_eq!(draft.items[0].unit_price_cents, 15000);
        assert_eq!(draft.items[0].unit_cost_cents, 10000);
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let cart = vec![(product("a", "c1", 100, 200), 0)];
        let err = build_sale("c1", &cart, None, at()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity(0)));

        let cart = vec![(product("a", "c1", 100, 200), -3)];
        let err = build_sale("c1", &cart, None, at()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity(-3)));
    }

    #[test]
    fn test_rejects_foreign_product() {
        let cart = vec![
            (product("a", "c1", 100, 200), 1),
            (product("b", "c2", 100, 200), 1),
        ];
        let err = build_sale("c1", &cart, None, at()).unwrap_err();
        match err {
            CoreError::ProductCompanyMismatch { product_id, company_id } => {
                assert_eq!(product_id, "b");
                assert_eq!(company_id, "c1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_negative_price() {
        let cart = vec![(product("a", "c1", 100, -1), 1)];
        let err = build_sale("c1", &cart, None, at()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMoney(-1)));
    }

    #[test]
    fn test_sale_number_format() {
        let number = generate_sale_number(at());
        assert!(number.starts_with("SALE-20260201-"));
        assert_eq!(number.len(), "SALE-20260201-00000".len());
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_empty_cart_builds_zero_totals() {
        let draft = build_sale("c1", &[], Some("empty".into()), at()).unwrap();
        assert_eq!(draft.sale.total_amount_cents, 0);
        assert_eq!(draft.sale.total_profit_cents, 0);
        assert!(draft.items.is_empty());
    }
}
