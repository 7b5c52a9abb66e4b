//! Inventory reconciliation domain.
//!
//! Everything here is deterministic domain logic (no IO, no storage): name
//! canonicalization, the catalog and stock-entry models, free-text resolution,
//! usage aggregation, the daily summary and low-stock rule evaluation.

pub mod alerts;
pub mod catalog;
pub mod consumption;
pub mod ledger;
pub mod movement;
pub mod naming;
pub mod resolver;
pub mod summary;

pub use alerts::{AlertNotice, LowStockCandidate, LowStockRule, LowStockRules, default_rules};
pub use catalog::{CatalogEdit, CatalogItem, CatalogPatch, Kind, KindUnit, NewCatalogItem, Unit};
pub use consumption::{ChannelFilter, Consumption, Order, OrderLine, aggregate};
pub use ledger::{StockEntry, StockEntryPatch, StockTotals};
pub use movement::{Movement, MovementType};
pub use resolver::{AliasMap, ItemRef, MatchKind, build_alias_map};
pub use summary::{Summary, SummaryRow, build_summary};
