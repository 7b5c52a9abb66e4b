//! Stock additions: one immutable-ish entry per restock.
//!
//! Entries can be corrected (quantity/note) or removed, but every correction is
//! mirrored by an audit movement carrying the before/after values.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{DayKey, DomainError, DomainResult, Entity, StockEntryId};

use crate::catalog::{CatalogItem, Unit};

/// One stock addition event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub id: StockEntryId,
    /// Owning catalog item.
    pub slug: String,
    /// Item display name at the time of entry.
    pub display_name: String,
    pub unit: Unit,
    pub quantity: u64,
    pub day: DayKey,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for StockEntry {
    type Id = StockEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl StockEntry {
    /// Restock entry for `item`. Quantity must be strictly positive.
    pub fn restock(
        id: StockEntryId,
        item: &CatalogItem,
        quantity: i64,
        note: impl Into<String>,
        day: DayKey,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let quantity = positive_quantity(quantity)?;
        Ok(Self {
            id,
            slug: item.slug.clone(),
            display_name: item.name.clone(),
            unit: item.unit,
            quantity,
            day,
            note: note.into().trim().to_string(),
            created_at: at,
            updated_at: at,
        })
    }

    /// Apply a correction; returns the audit note describing it.
    pub fn apply_patch(&mut self, patch: &StockEntryPatch, at: DateTime<Utc>) -> DomainResult<String> {
        let new_quantity = match patch.quantity {
            Some(q) => non_negative_quantity(q)?,
            None => self.quantity,
        };
        let new_note = match &patch.note {
            Some(n) => n.trim().to_string(),
            None => self.note.clone(),
        };

        let mut audit = format!("edit qty:{}->{}", self.quantity, new_quantity);
        if new_note != self.note {
            audit.push_str(&format!("; note:{}->{}", self.note, new_note));
        }

        self.quantity = new_quantity;
        self.note = new_note;
        self.updated_at = at;
        Ok(audit)
    }

    /// Audit note for a removed entry: `deleted +Q unit[ - note]`.
    pub fn deletion_note(&self) -> String {
        let mut note = format!("deleted +{} {}", self.quantity, self.unit);
        if !self.note.is_empty() {
            note.push_str(" - ");
            note.push_str(&self.note);
        }
        note
    }

    /// Display note used when the entry is shown as an `add` movement.
    pub fn addition_note(&self) -> String {
        let mut note = format!("+{} {}", self.quantity, self.unit);
        if !self.note.is_empty() {
            note.push_str(" - ");
            note.push_str(&self.note);
        }
        note
    }
}

/// Correction to an existing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntryPatch {
    pub quantity: Option<i64>,
    pub note: Option<String>,
}

/// Totals added per slug, split by unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockTotals {
    grams: HashMap<String, u64>,
    pieces: HashMap<String, u64>,
}

impl StockTotals {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a StockEntry>) -> Self {
        let mut totals = Self::default();
        for entry in entries {
            totals.add(&entry.slug, entry.unit, entry.quantity);
        }
        totals
    }

    pub fn add(&mut self, slug: &str, unit: Unit, quantity: u64) {
        let bucket = match unit {
            Unit::Gram => &mut self.grams,
            Unit::Piece => &mut self.pieces,
        };
        let total = bucket.entry(slug.to_string()).or_insert(0);
        *total = total.saturating_add(quantity);
    }

    pub fn get(&self, slug: &str, unit: Unit) -> u64 {
        let bucket = match unit {
            Unit::Gram => &self.grams,
            Unit::Piece => &self.pieces,
        };
        bucket.get(slug).copied().unwrap_or(0)
    }

    /// Remove both buckets for `slug`, returning `(grams, pieces)`.
    pub fn take(&mut self, slug: &str) -> (u64, u64) {
        (
            self.grams.remove(slug).unwrap_or(0),
            self.pieces.remove(slug).unwrap_or(0),
        )
    }

    pub fn into_buckets(self) -> (HashMap<String, u64>, HashMap<String, u64>) {
        (self.grams, self.pieces)
    }
}

fn positive_quantity(q: i64) -> DomainResult<u64> {
    if q <= 0 {
        return Err(DomainError::validation(format!(
            "invalid quantity: {q} (a positive quantity is required)"
        )));
    }
    Ok(q.unsigned_abs())
}

fn non_negative_quantity(q: i64) -> DomainResult<u64> {
    if q < 0 {
        return Err(DomainError::validation(format!(
            "invalid quantity: {q} (quantity cannot be negative)"
        )));
    }
    Ok(q.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Kind, NewCatalogItem};
    use larder_core::CatalogItemId;

    fn day() -> DayKey {
        "2024-05-01".parse().unwrap()
    }

    fn rice() -> CatalogItem {
        CatalogItem::create(
            CatalogItemId::new(),
            NewCatalogItem::new("Fried Rice", Kind::Food, Unit::Gram),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn restock_copies_item_identity() {
        let entry = StockEntry::restock(StockEntryId::new(), &rice(), 5000, " morning ", day(), Utc::now())
            .unwrap();
        assert_eq!(entry.slug, "friedrice");
        assert_eq!(entry.display_name, "Fried Rice");
        assert_eq!(entry.unit, Unit::Gram);
        assert_eq!(entry.quantity, 5000);
        assert_eq!(entry.note, "morning");
    }

    #[test]
    fn restock_rejects_non_positive_quantity() {
        for q in [0, -5] {
            let err = StockEntry::restock(StockEntryId::new(), &rice(), q, "", day(), Utc::now())
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn patch_allows_zero_but_not_negative() {
        let mut entry =
            StockEntry::restock(StockEntryId::new(), &rice(), 100, "", day(), Utc::now()).unwrap();
        let note = entry
            .apply_patch(&StockEntryPatch { quantity: Some(0), note: None }, Utc::now())
            .unwrap();
        assert_eq!(entry.quantity, 0);
        assert_eq!(note, "edit qty:100->0");

        let err = entry
            .apply_patch(&StockEntryPatch { quantity: Some(-1), note: None }, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(entry.quantity, 0);
    }

    #[test]
    fn patch_note_is_audited_only_when_changed() {
        let mut entry =
            StockEntry::restock(StockEntryId::new(), &rice(), 100, "a", day(), Utc::now()).unwrap();
        let note = entry
            .apply_patch(
                &StockEntryPatch {
                    quantity: Some(120),
                    note: Some("b".into()),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(note, "edit qty:100->120; note:a->b");
    }

    #[test]
    fn deletion_and_addition_notes() {
        let entry =
            StockEntry::restock(StockEntryId::new(), &rice(), 700, "late delivery", day(), Utc::now())
                .unwrap();
        assert_eq!(entry.deletion_note(), "deleted +700 gram - late delivery");
        assert_eq!(entry.addition_note(), "+700 gram - late delivery");
    }

    #[test]
    fn totals_split_by_unit() {
        let mut totals = StockTotals::default();
        totals.add("friedrice", Unit::Gram, 1000);
        totals.add("friedrice", Unit::Gram, 500);
        totals.add("coke", Unit::Piece, 24);
        assert_eq!(totals.get("friedrice", Unit::Gram), 1500);
        assert_eq!(totals.get("friedrice", Unit::Piece), 0);
        assert_eq!(totals.take("coke"), (0, 24));
        assert_eq!(totals.get("coke", Unit::Piece), 0);
    }
}
