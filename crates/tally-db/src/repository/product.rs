//! # Product Repository
//!
//! Catalog lookups for the ledger core - the "product directory" the rest of
//! the system consumes. Catalog management itself happens outside the core;
//! insert/activation operations exist so tests and collaborators can
//! provision companies.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::Product;

const PRODUCT_COLUMNS: &str = "id, company_id, sku, name, description, \
     cost_cents, price_cents, is_active, created_at, updated_at";

/// Repository for product lookups.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// Takes an executor so validation lookups can share the caller's
    /// transaction; pass the pool when no transaction is open.
    pub async fn find_by_id<'e, E>(&self, executor: E, id: &str) -> DbResult<Option<Product>>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(product)
    }

    /// Gets a product by its SKU within a company.
    pub async fn find_by_sku(&self, company_id: &str, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE company_id = ?1 AND sku = ?2"
        ))
        .bind(company_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists a company's active products, ordered by SKU.
    pub async fn list_active(&self, company_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE company_id = ?1 AND is_active = 1 ORDER BY sku"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Errors
    /// * `DbError::UniqueViolation` - duplicate (company, sku) pair
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, company_id = %product.company_id, "Inserting product");

        sqlx::query(
            "INSERT INTO products ( \
                id, company_id, sku, name, description, \
                cost_cents, price_cents, is_active, created_at, updated_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&product.id)
        .bind(&product.company_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.cost_cents)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Toggles a product's active flag (soft delete / restore).
    pub async fn set_active(&self, id: &str, active: bool, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
