//! Storage boundary for the inventory engine.
//!
//! Four narrow traits, one per kind of durable state. The service talks to
//! them through `Arc<dyn ...>` so in-memory and Postgres adapters are
//! interchangeable.

use chrono::{DateTime, Utc};
use thiserror::Error;

use larder_core::{CatalogItemId, DayKey, StockEntryId};
use larder_inventory::{CatalogItem, Movement, MovementType, Order, StockEntry};

pub mod memory;
pub mod postgres;

pub use memory::{
    InMemoryCatalogCascade, InMemoryCatalogStore, InMemoryMovementLog, InMemoryOrderSource, InMemoryStockLedger,
};
pub use postgres::PostgresInventoryStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness rule was violated (slug, or the daily alert witness).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Outcome of trying to record today's `low_stock` witness for a slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertGate {
    /// This call wrote the witness; the alert may be dispatched.
    Recorded,
    /// A witness for the same slug and day already exists.
    AlreadyRecorded,
}

#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError>;

    async fn get_item(&self, id: CatalogItemId) -> Result<Option<CatalogItem>, StoreError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CatalogItem>, StoreError>;

    /// Insert a new item. `Conflict` if the slug is already taken.
    async fn insert_item(&self, item: &CatalogItem) -> Result<(), StoreError>;

    /// Replace the item with the same id. `Conflict` if the (possibly new)
    /// slug belongs to another item, `NotFound` if the id is unknown.
    async fn update_item(&self, item: &CatalogItem) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait StockLedgerStore: Send + Sync {
    async fn insert_entry(&self, entry: &StockEntry) -> Result<(), StoreError>;

    async fn get_entry(&self, id: StockEntryId) -> Result<Option<StockEntry>, StoreError>;

    async fn update_entry(&self, entry: &StockEntry) -> Result<(), StoreError>;

    async fn delete_entry(&self, id: StockEntryId) -> Result<(), StoreError>;

    /// Entries counted toward `day`, newest first.
    async fn entries_for_day(&self, day: DayKey) -> Result<Vec<StockEntry>, StoreError>;

    async fn delete_for_day(&self, day: DayKey) -> Result<u64, StoreError>;
}

/// Catalog changes that carry the item's stock entries along. Each call is
/// all-or-nothing: on error neither the item nor its entries have changed.
#[async_trait::async_trait]
pub trait CatalogCascade: Send + Sync {
    /// Remove the item and every stock entry under its slug. Returns how many
    /// entries were removed; `NotFound` if the item is unknown.
    async fn delete_with_entries(&self, item: &CatalogItem) -> Result<u64, StoreError>;

    /// Store the re-slugged `item` and move the entries of `previous_slug`
    /// under its new slug and name. Returns how many entries moved; `Conflict`
    /// if another item owns the new slug.
    async fn rename_with_entries(&self, item: &CatalogItem, previous_slug: &str) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
pub trait MovementLog: Send + Sync {
    async fn append(&self, movement: &Movement) -> Result<(), StoreError>;

    /// Whether any movement of `movement_type` was ever recorded for `slug`.
    async fn exists(&self, slug: &str, movement_type: MovementType) -> Result<bool, StoreError>;

    /// Movements dated `day` except `low_stock` witnesses, newest first, at
    /// most `limit`.
    async fn listed_for_day(&self, day: DayKey, limit: usize) -> Result<Vec<Movement>, StoreError>;

    /// Atomically write a `low_stock` witness unless one exists for the same
    /// slug and day.
    async fn record_alert(&self, movement: &Movement) -> Result<AlertGate, StoreError>;
}

/// Read-only view of the order-intake side.
#[async_trait::async_trait]
pub trait OrderSource: Send + Sync {
    /// Orders placed in `[start, end)`.
    async fn orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;
}
