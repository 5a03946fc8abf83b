//! # Repository Module
//!
//! One repository per aggregate, SQL isolated per file.
//!
//! ## Transaction Participation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Methods that must run inside a service-owned transaction take a        │
//! │  SqliteExecutor as their first argument:                                │
//! │                                                                         │
//! │    let mut tx = db.pool().begin().await?;                               │
//! │    let product = db.products().find_by_id(&mut *tx, id).await?;         │
//! │    db.inventory().insert(&mut *tx, &movement).await?;                   │
//! │    tx.commit().await?;                                                  │
//! │                                                                         │
//! │  Callers with no transaction open pass the pool instead.                │
//! │  Pure reads that never need transaction scope use the held pool.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - catalog lookups (the product directory)
//! - [`inventory::InventoryRepository`] - the append-only stock ledger
//! - [`sale::SaleRepository`] - sale headers, line items, report queries

pub mod inventory;
pub mod product;
pub mod sale;
