//! Audit trail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{DayKey, Entity, MovementId};

use crate::catalog::{CatalogItem, Unit};
use crate::ledger::StockEntry;

/// Slug used by movements that are not about a single item.
pub const ALL_ITEMS_SLUG: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Create,
    Edit,
    Delete,
    Add,
    EditStock,
    DeleteStock,
    LowStock,
    Reset,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Create => "create",
            MovementType::Edit => "edit",
            MovementType::Delete => "delete",
            MovementType::Add => "add",
            MovementType::EditStock => "edit_stock",
            MovementType::DeleteStock => "delete_stock",
            MovementType::LowStock => "low_stock",
            MovementType::Reset => "reset",
        }
    }

    /// Types shown in the operator-facing movement listing.
    pub fn is_listed(self) -> bool {
        !matches!(self, MovementType::LowStock)
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = larder_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "create" => MovementType::Create,
            "edit" => MovementType::Edit,
            "delete" => MovementType::Delete,
            "add" => MovementType::Add,
            "edit_stock" => MovementType::EditStock,
            "delete_stock" => MovementType::DeleteStock,
            "low_stock" => MovementType::LowStock,
            "reset" => MovementType::Reset,
            other => {
                return Err(larder_core::DomainError::validation(format!(
                    "unknown movement type {other:?}"
                )));
            }
        })
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub sku: String,
    pub slug: String,
    pub unit: Option<Unit>,
    #[serde(default)]
    pub note: String,
    pub day: DayKey,
    pub created_at: DateTime<Utc>,
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Movement {
    pub fn for_item(
        movement_type: MovementType,
        item: &CatalogItem,
        note: impl Into<String>,
        day: DayKey,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            movement_type,
            sku: item.name.clone(),
            slug: item.slug.clone(),
            unit: Some(item.unit),
            note: note.into(),
            day,
            created_at: at,
        }
    }

    pub fn for_entry(
        movement_type: MovementType,
        entry: &StockEntry,
        note: impl Into<String>,
        day: DayKey,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            movement_type,
            sku: entry.display_name.clone(),
            slug: entry.slug.clone(),
            unit: Some(entry.unit),
            note: note.into(),
            day,
            created_at: at,
        }
    }

    /// `low_stock` witness for a summary row.
    pub fn low_stock(
        sku: &str,
        slug: &str,
        unit: Unit,
        note: impl Into<String>,
        day: DayKey,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            movement_type: MovementType::LowStock,
            sku: sku.to_string(),
            slug: slug.to_string(),
            unit: Some(unit),
            note: note.into(),
            day,
            created_at: at,
        }
    }

    pub fn reset(cleared: usize, day: DayKey, at: DateTime<Utc>) -> Self {
        Self {
            id: MovementId::new(),
            movement_type: MovementType::Reset,
            sku: "All items".to_string(),
            slug: ALL_ITEMS_SLUG.to_string(),
            unit: None,
            note: format!("reset today: cleared {cleared} stock entries"),
            day,
            created_at: at,
        }
    }

    /// Listing row synthesized from a stock entry. Never persisted.
    pub fn synthesized_add(entry: &StockEntry) -> Self {
        Self {
            id: MovementId::from_uuid(*entry.id.as_uuid()),
            movement_type: MovementType::Add,
            sku: entry.display_name.clone(),
            slug: entry.slug.clone(),
            unit: Some(entry.unit),
            note: entry.addition_note(),
            day: entry.day,
            created_at: entry.created_at,
        }
    }
}

/// Merge stored movements with synthesized `add` rows, newest first.
pub fn merge_for_listing(stored: Vec<Movement>, entries: &[StockEntry], limit: usize) -> Vec<Movement> {
    let mut rows: Vec<Movement> = stored
        .into_iter()
        .filter(|m| m.movement_type.is_listed())
        .chain(entries.iter().map(Movement::synthesized_add))
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    rows.truncate(limit);
    rows
}
