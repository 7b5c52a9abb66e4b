//! Domain foundation building blocks for the inventory engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! errors, identifiers, and the shop-local calendar every daily view is cut by.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;

pub use clock::{Clock, DayKey, FixedClock, ShopClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CatalogItemId, MovementId, StockEntryId};
