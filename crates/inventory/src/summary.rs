//! Added/used/remaining rows for one day.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use larder_core::CatalogItemId;

use crate::catalog::{CatalogItem, Kind, Unit, sort_for_listing};
use crate::consumption::Consumption;
use crate::ledger::StockTotals;
use crate::naming::infer_kind_unit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Catalog identity; `None` for unconfigured and informational rows.
    pub id: Option<CatalogItemId>,
    pub sku: String,
    pub slug: String,
    pub unit: Unit,
    pub kind: Kind,
    pub added: u64,
    pub used: u64,
    pub remaining: u64,
    /// False when the slug has no catalog entry.
    pub configured: bool,
    /// Extra/half display row; never alerted on or subtracted from stock.
    #[serde(default)]
    pub informational: bool,
}

impl SummaryRow {
    fn new(
        id: Option<CatalogItemId>,
        sku: &str,
        slug: &str,
        unit: Unit,
        kind: Kind,
        added: u64,
        used: u64,
    ) -> Self {
        Self {
            id,
            sku: sku.to_string(),
            slug: slug.to_string(),
            unit,
            kind,
            added,
            used,
            remaining: added.saturating_sub(used),
            configured: id.is_some(),
            informational: false,
        }
    }
}

/// Rows grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub food: Vec<SummaryRow>,
    pub drinks: Vec<SummaryRow>,
    pub proteins: Vec<SummaryRow>,
}

impl Summary {
    fn push(&mut self, row: SummaryRow) {
        match row.kind {
            Kind::Food => self.food.push(row),
            Kind::Drink => self.drinks.push(row),
            Kind::Protein => self.proteins.push(row),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &SummaryRow> {
        self.food.iter().chain(&self.drinks).chain(&self.proteins)
    }

    pub fn row(&self, slug: &str) -> Option<&SummaryRow> {
        self.rows().find(|r| r.slug == slug && !r.informational)
    }
}

/// Join stock totals and usage per item.
///
/// Catalog items come first (kind, then name), each claiming both unit buckets
/// for its slug. Whatever is left belongs to unknown slugs and is emitted in
/// slug order with an inferred kind. Portion display rows close the food group.
pub fn build_summary(items: &[CatalogItem], added: &StockTotals, used: &Consumption) -> Summary {
    let mut added = added.clone();
    let mut used = used.clone();
    let mut summary = Summary::default();

    let mut ordered = items.to_vec();
    sort_for_listing(&mut ordered);

    for item in &ordered {
        let (added_g, added_p) = added.take(&item.slug);
        let (used_g, used_p) = used.take(&item.slug);
        let (a, u) = match item.unit {
            Unit::Gram => (added_g, used_g),
            Unit::Piece => (added_p, used_p),
        };
        summary.push(SummaryRow::new(
            Some(item.id),
            &item.name,
            &item.slug,
            item.unit,
            item.kind,
            a,
            u,
        ));
    }

    let mut leftovers: BTreeMap<(String, Unit), (u64, u64)> = BTreeMap::new();
    let (added_g, added_p) = added.into_buckets();
    for (slug, q) in added_g {
        leftovers.entry((slug, Unit::Gram)).or_default().0 += q;
    }
    for (slug, q) in added_p {
        leftovers.entry((slug, Unit::Piece)).or_default().0 += q;
    }
    for (slug, q) in used.grams {
        leftovers.entry((slug, Unit::Gram)).or_default().1 += q;
    }
    for (slug, q) in used.pieces {
        leftovers.entry((slug, Unit::Piece)).or_default().1 += q;
    }
    for ((slug, unit), (a, u)) in leftovers {
        let kind = infer_kind_unit(&slug).kind;
        summary.push(SummaryRow::new(None, &slug, &slug, unit, kind, a, u));
    }

    for (slug, grams) in used.portion_grams {
        summary.food.push(SummaryRow {
            id: None,
            sku: slug.clone(),
            slug,
            unit: Unit::Gram,
            kind: Kind::Food,
            added: 0,
            used: grams,
            remaining: 0,
            configured: false,
            informational: true,
        });
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewCatalogItem;
    use crate::consumption::{ChannelFilter, Order, OrderLine, aggregate};
    use crate::resolver::build_alias_map;
    use chrono::Utc;
    use proptest::prelude::*;

    fn item(name: &str, kind: Kind, unit: Unit) -> CatalogItem {
        CatalogItem::create(CatalogItemId::new(), NewCatalogItem::new(name, kind, unit), Utc::now())
            .unwrap()
    }

    fn orders(lines: &[(&str, i64)]) -> Vec<Order> {
        vec![Order {
            id: "o1".into(),
            channel: "dine-in".into(),
            placed_at: Utc::now(),
            items: lines
                .iter()
                .map(|(n, q)| OrderLine {
                    name: n.to_string(),
                    quantity: *q,
                    price: 1500.0,
                })
                .collect(),
        }]
    }

    #[test]
    fn jollof_extra_deducts_from_base_stock() {
        let items = vec![item("Jollof Rice", Kind::Food, Unit::Gram)];
        let mut added = StockTotals::default();
        added.add("jollofrice", Unit::Gram, 5000);
        let used = aggregate(&orders(&[("Jollof Rice Extra", 2)]), &build_alias_map(&items), &ChannelFilter::All);

        let summary = build_summary(&items, &added, &used);
        let row = summary.row("jollofrice").unwrap();
        assert_eq!((row.added, row.used, row.remaining), (5000, 350, 4650));
        assert!(row.configured);

        let extra = summary.food.iter().find(|r| r.informational).unwrap();
        assert_eq!(extra.slug, "jollofriceextra");
        assert_eq!((extra.added, extra.used, extra.remaining), (0, 350, 0));
    }

    #[test]
    fn unknown_drink_surfaces_as_unconfigured_row() {
        let used = aggregate(&orders(&[("Coke", 3)]), &build_alias_map(&[]), &ChannelFilter::All);
        let summary = build_summary(&[], &StockTotals::default(), &used);

        assert!(summary.food.is_empty());
        let row = &summary.drinks[0];
        assert_eq!(row.slug, "coke");
        assert_eq!(row.kind, Kind::Drink);
        assert_eq!(row.unit, Unit::Piece);
        assert_eq!((row.added, row.used, row.remaining), (0, 3, 0));
        assert!(!row.configured);
        assert!(row.id.is_none());
    }

    #[test]
    fn configured_item_claims_both_buckets() {
        // A gram-unit item that also has piece usage under its slug must not
        // leave a phantom leftover row behind.
        let items = vec![item("Plantain", Kind::Food, Unit::Gram)];
        let mut used = Consumption::default();
        used.pieces.insert("plantain".into(), 4);
        let summary = build_summary(&items, &StockTotals::default(), &used);
        assert_eq!(summary.food.len(), 1);
        assert!(summary.food[0].configured);
    }

    #[test]
    fn rows_are_grouped_and_ordered() {
        let items = vec![
            item("Zobo", Kind::Drink, Unit::Piece),
            item("Turkey", Kind::Protein, Unit::Piece),
            item("Fried Rice", Kind::Food, Unit::Gram),
            item("Coke", Kind::Drink, Unit::Piece),
        ];
        let mut used = Consumption::default();
        used.pieces.insert("water".into(), 2);
        used.pieces.insert("fanta".into(), 1);
        let summary = build_summary(&items, &StockTotals::default(), &used);

        let drinks: Vec<_> = summary.drinks.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(drinks, vec!["coke", "zobo", "fanta", "water"]);
        assert_eq!(summary.proteins[0].slug, "turkey");
        assert_eq!(summary.food[0].slug, "friedrice");
    }

    #[test]
    fn summary_serializes_with_group_keys() {
        let json = serde_json::to_value(build_summary(&[], &StockTotals::default(), &Consumption::default()))
            .unwrap();
        assert!(json.get("food").is_some());
        assert!(json.get("drinks").is_some());
        assert!(json.get("proteins").is_some());
    }

    proptest! {
        #[test]
        fn remaining_is_clamped_difference(added in 0u64..100_000, plates in 0i64..400) {
            let items = vec![item("Fried Rice", Kind::Food, Unit::Gram)];
            let mut totals = StockTotals::default();
            totals.add("friedrice", Unit::Gram, added);
            let used = aggregate(&orders(&[("Fried Rice", plates)]), &build_alias_map(&items), &ChannelFilter::All);

            let summary = build_summary(&items, &totals, &used);
            for row in summary.rows() {
                prop_assert_eq!(row.remaining, row.added.saturating_sub(row.used));
            }
            let row = summary.row("friedrice").unwrap();
            prop_assert_eq!(row.used, 350 * plates as u64);
        }
    }
}
