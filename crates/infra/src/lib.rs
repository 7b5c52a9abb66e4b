//! Infrastructure layer: storage adapters, configuration, the alert seam and
//! the inventory service that ties them together.

pub mod config;
pub mod notifier;
pub mod service;
pub mod store;

mod integration_tests;

pub use config::{ConfigError, InventoryConfig, InventorySettings};
pub use notifier::{AlertNotifier, NotifyError, TracingNotifier};
pub use service::{
    AddStock, AlertReport, InventoryError, InventoryResult, InventoryService, InventoryStores, UpsertItem,
};
pub use store::{
    AlertGate, CatalogCascade, CatalogStore, MovementLog, OrderSource, StockLedgerStore, StoreError,
};
