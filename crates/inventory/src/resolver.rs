//! Free-text to catalog item resolution.
//!
//! [`AliasMap`] is a request-scoped snapshot over a slice of catalog items.
//! Build one per reconciliation pass with [`build_alias_map`] and pass it down;
//! it borrows the items and owns no persistent state.

use std::collections::HashMap;

use larder_core::CatalogItemId;

use crate::catalog::{CatalogItem, Kind, listing_order};
use crate::naming::{base_food_slug, loose_key, normalize_slug};

/// Containment matching is skipped for keys shorter than this, so that a
/// stray "a" or "rc" never claims an unrelated item.
pub const MIN_CONTAINS_KEY_LEN: usize = 3;

/// Which resolution layer produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Id,
    Exact,
    Base,
    Loose,
    Contains,
}

/// Reference to an item as callers supply it: any subset of id, slug and
/// free-text name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemRef {
    pub id: Option<CatalogItemId>,
    pub slug: Option<String>,
    pub sku: Option<String>,
}

impl ItemRef {
    pub fn by_id(id: CatalogItemId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_sku(sku: impl Into<String>) -> Self {
        Self {
            sku: Some(sku.into()),
            ..Self::default()
        }
    }

    fn candidates(&self) -> impl Iterator<Item = &str> {
        self.slug
            .as_deref()
            .into_iter()
            .chain(self.sku.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

#[derive(Debug)]
pub struct AliasMap<'a> {
    items: &'a [CatalogItem],
    /// Indices of `items` in listing order; every order-sensitive step walks
    /// this instead of the slice.
    order: Vec<usize>,
    by_id: HashMap<CatalogItemId, usize>,
    by_slug: HashMap<&'a str, usize>,
    alias_to_slug: HashMap<String, &'a str>,
    by_loose: HashMap<String, usize>,
}

/// Index a catalog snapshot.
///
/// The alias map holds every item's slug, each normalized alias and, for food
/// items, the base-food slug of the name. The loose index holds loose keys of
/// names and slugs (plus base variants for food). Items are visited in
/// listing order whatever order the slice is in; on key clashes the later item
/// wins, except that an item's own slug always wins.
pub fn build_alias_map(items: &[CatalogItem]) -> AliasMap<'_> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| listing_order(&items[a], &items[b]));

    let mut map = AliasMap {
        items,
        order,
        by_id: HashMap::with_capacity(items.len()),
        by_slug: HashMap::with_capacity(items.len()),
        alias_to_slug: HashMap::new(),
        by_loose: HashMap::new(),
    };

    for &idx in &map.order {
        let item = &items[idx];
        map.by_id.insert(item.id, idx);
        map.by_slug.insert(item.slug.as_str(), idx);

        for alias in &item.aliases {
            let key = normalize_slug(alias);
            if !key.is_empty() {
                map.alias_to_slug.insert(key, item.slug.as_str());
            }
        }
        if item.kind == Kind::Food {
            let base = base_food_slug(&item.name);
            if !base.is_empty() {
                map.alias_to_slug.insert(base, item.slug.as_str());
            }
        }

        map.by_loose.insert(loose_key(&item.name), idx);
        map.by_loose.insert(loose_key(&item.slug), idx);
        if item.kind == Kind::Food {
            map.by_loose.insert(loose_key(&base_food_slug(&item.name)), idx);
        }
    }
    // Own slugs are inserted last so an alias can never shadow a real item.
    for item in items {
        map.alias_to_slug.insert(item.slug.clone(), item.slug.as_str());
    }
    map.by_loose.remove("");

    map
}

impl<'a> AliasMap<'a> {
    pub fn items(&self) -> &'a [CatalogItem] {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn by_slug(&self, slug: &str) -> Option<&'a CatalogItem> {
        self.by_slug.get(slug).map(|&idx| &self.items[idx])
    }

    pub fn by_id(&self, id: &CatalogItemId) -> Option<&'a CatalogItem> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    /// Layered resolution, first match wins.
    pub fn resolve(&self, item_ref: &ItemRef) -> Option<(&'a CatalogItem, MatchKind)> {
        if let Some(item) = item_ref.id.as_ref().and_then(|id| self.by_id(id)) {
            return Some((item, MatchKind::Id));
        }

        let candidates: Vec<&str> = item_ref.candidates().collect();

        for raw in &candidates {
            if let Some(item) = self.lookup_alias(&normalize_slug(raw)) {
                return Some((item, MatchKind::Exact));
            }
        }
        for raw in &candidates {
            if let Some(item) = self.lookup_alias(&base_food_slug(raw)) {
                return Some((item, MatchKind::Base));
            }
        }
        for raw in &candidates {
            let loose = loose_key(raw);
            let loose_base = base_food_slug(&loose);
            let hit = self
                .lookup_loose(&loose)
                .or_else(|| self.lookup_loose(&loose_base));
            if let Some(item) = hit {
                return Some((item, MatchKind::Loose));
            }
        }
        for raw in &candidates {
            if let Some(item) = self.lookup_contains(&loose_key(raw)) {
                return Some((item, MatchKind::Contains));
            }
        }

        None
    }

    /// Resolve a bare free-text name, as found on order lines.
    pub fn resolve_name(&self, raw: &str) -> Option<&'a CatalogItem> {
        self.resolve(&ItemRef::by_sku(raw)).map(|(item, _)| item)
    }

    fn lookup_alias(&self, key: &str) -> Option<&'a CatalogItem> {
        if key.is_empty() {
            return None;
        }
        self.alias_to_slug
            .get(key)
            .and_then(|slug| self.by_slug(slug))
    }

    fn lookup_loose(&self, key: &str) -> Option<&'a CatalogItem> {
        if key.is_empty() {
            return None;
        }
        self.by_loose.get(key).map(|&idx| &self.items[idx])
    }

    fn lookup_contains(&self, key: &str) -> Option<&'a CatalogItem> {
        if key.len() < MIN_CONTAINS_KEY_LEN {
            return None;
        }
        self.order.iter().map(|&idx| &self.items[idx]).find(|item| {
            [loose_key(&item.name), loose_key(&item.slug)]
                .iter()
                .filter(|k| k.len() >= MIN_CONTAINS_KEY_LEN)
                .any(|k| k.contains(key) || key.contains(k.as_str()))
        })
    }
}
