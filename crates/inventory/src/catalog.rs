//! Catalog of trackable SKUs.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{CatalogItemId, DomainError, DomainResult, Entity};

use crate::naming::{base_food_slug, normalize_slug};

/// Category of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Food,
    Drink,
    Protein,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Food => "food",
            Kind::Drink => "drink",
            Kind::Protein => "protein",
        }
    }
}

impl core::fmt::Display for Kind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Kind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "food" => Ok(Kind::Food),
            "drink" => Ok(Kind::Drink),
            "protein" => Ok(Kind::Protein),
            other => Err(DomainError::validation(format!(
                "kind must be one of: food, drink, protein (got {other:?})"
            ))),
        }
    }
}

/// Measurement basis of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Gram,
    Piece,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Gram => "gram",
            Unit::Piece => "piece",
        }
    }

    /// Short suffix used in audit notes and alert texts.
    pub fn abbreviation(self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Piece => "pcs",
        }
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Unit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gram" => Ok(Unit::Gram),
            "piece" => Ok(Unit::Piece),
            other => Err(DomainError::validation(format!(
                "unit must be one of: gram, piece (got {other:?})"
            ))),
        }
    }
}

/// Kind and unit together, as produced by the fallback classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindUnit {
    pub kind: Kind,
    pub unit: Unit,
}

impl KindUnit {
    pub fn new(kind: Kind, unit: Unit) -> Self {
        Self { kind, unit }
    }
}

/// One trackable SKU.
///
/// `slug` is always `normalize_slug(name)` and is unique across the catalog;
/// stores enforce the uniqueness, this type enforces the derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: CatalogItemId,
    pub name: String,
    pub slug: String,
    pub kind: Kind,
    pub unit: Unit,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for CatalogItem {
    type Id = CatalogItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating (or upserting) a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCatalogItem {
    pub name: String,
    pub kind: Kind,
    pub unit: Unit,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl NewCatalogItem {
    pub fn new(name: impl Into<String>, kind: Kind, unit: Unit) -> Self {
        Self {
            name: name.into(),
            kind,
            unit,
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

impl CatalogItem {
    /// Validate input and build a fresh item.
    pub fn create(id: CatalogItemId, input: NewCatalogItem, at: DateTime<Utc>) -> DomainResult<Self> {
        let name = validated_name(&input.name)?;
        let slug = slug_for(&name)?;
        Ok(Self {
            id,
            name,
            slug,
            kind: input.kind,
            unit: input.unit,
            aliases: clean_aliases(input.aliases),
            created_at: at,
            updated_at: at,
        })
    }

    /// Build an item whose slug is the base-food slug of `typed` rather than
    /// its plain slug. Used when a restock names an unknown portion variant so
    /// the new item absorbs "Extra"/"Half" usage as well.
    pub fn create_base(
        id: CatalogItemId,
        display_name: &str,
        typed: &str,
        kind_unit: KindUnit,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = validated_name(display_name)?;
        let slug = base_food_slug(typed);
        if slug.is_empty() {
            return Err(DomainError::validation(format!(
                "{typed:?} does not contain any letters or digits"
            )));
        }
        Ok(Self {
            id,
            name,
            slug,
            kind: kind_unit.kind,
            unit: kind_unit.unit,
            aliases: Vec::new(),
            created_at: at,
            updated_at: at,
        })
    }

    /// Overwrite name/kind/unit/aliases in place (upsert on an existing slug).
    pub fn overwrite(&mut self, input: NewCatalogItem, at: DateTime<Utc>) -> DomainResult<()> {
        let name = validated_name(&input.name)?;
        let slug = slug_for(&name)?;
        if slug != self.slug {
            return Err(DomainError::invariant(format!(
                "upsert of {:?} cannot change slug {} to {slug}",
                input.name, self.slug
            )));
        }
        self.name = name;
        self.kind = input.kind;
        self.unit = input.unit;
        self.aliases = clean_aliases(input.aliases);
        self.updated_at = at;
        Ok(())
    }

    /// Apply a patch, returning the edited copy. `self` is left untouched so a
    /// caller can still reject the result (e.g. on a slug collision).
    pub fn patched(&self, patch: &CatalogPatch, at: DateTime<Utc>) -> DomainResult<CatalogEdit> {
        let mut next = self.clone();

        if let Some(name) = &patch.name {
            let name = validated_name(name)?;
            if name != self.name {
                next.slug = slug_for(&name)?;
                next.name = name;
            }
        }
        if let Some(kind) = patch.kind {
            next.kind = kind;
        }
        if let Some(unit) = patch.unit {
            next.unit = unit;
        }
        if let Some(aliases) = &patch.aliases {
            next.aliases = clean_aliases(aliases.clone());
        }
        next.updated_at = at;

        let note = format!(
            "Edited: {} -> {}",
            ItemFields::of(self).to_json(),
            ItemFields::of(&next).to_json()
        );
        let previous_slug = (next.slug != self.slug).then(|| self.slug.clone());

        Ok(CatalogEdit {
            item: next,
            previous_slug,
            note,
        })
    }
}

impl CatalogEdit {
    /// Reject the edit if it moved the item onto a slug that `owner` (the
    /// current holder of the new slug, if any) already claims.
    pub fn ensure_slug_free(&self, owner: Option<&CatalogItem>) -> DomainResult<()> {
        if self.previous_slug.is_none() {
            return Ok(());
        }
        match owner {
            Some(other) if other.id != self.item.id => Err(DomainError::conflict(format!(
                "sku {:?} already exists as {:?}",
                self.item.slug, other.name
            ))),
            _ => Ok(()),
        }
    }
}

/// Partial update of a catalog item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPatch {
    pub name: Option<String>,
    pub kind: Option<Kind>,
    pub unit: Option<Unit>,
    pub aliases: Option<Vec<String>>,
}

impl CatalogPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Result of applying a [`CatalogPatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEdit {
    pub item: CatalogItem,
    /// Set when the rename moved the item to a new slug; stock entries under
    /// this slug must follow it.
    pub previous_slug: Option<String>,
    /// Audit text describing before/after.
    pub note: String,
}

#[derive(Serialize)]
struct ItemFields<'a> {
    name: &'a str,
    kind: Kind,
    unit: Unit,
}

impl<'a> ItemFields<'a> {
    fn of(item: &'a CatalogItem) -> Self {
        Self {
            name: &item.name,
            kind: item.kind,
            unit: item.unit,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{}/{}/{}", self.name, self.kind, self.unit))
    }
}

fn validated_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("sku cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn slug_for(name: &str) -> DomainResult<String> {
    let slug = normalize_slug(name);
    if slug.is_empty() {
        return Err(DomainError::validation(format!(
            "{name:?} does not contain any letters or digits"
        )));
    }
    Ok(slug)
}

fn clean_aliases(aliases: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = aliases
        .into_iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !normalize_slug(a).is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Catalog listing order: kind by its wire name (drink, food, protein), then
/// name. Slug and id break ties so the order is total.
pub fn listing_order(a: &CatalogItem, b: &CatalogItem) -> Ordering {
    a.kind
        .as_str()
        .cmp(b.kind.as_str())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.slug.cmp(&b.slug))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_for_listing(items: &mut [CatalogItem]) {
    items.sort_by(listing_order);
}
