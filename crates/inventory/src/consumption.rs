//! Usage derived from the day's orders.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Unit;
use crate::naming::{base_food_slug, grams_for_name, infer_kind_unit, is_portion_variant, normalize_slug};
use crate::resolver::AliasMap;

/// An order as read from the order-intake side. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Intake path the order came through (e.g. `dine-in`, `delivery`).
    #[serde(default)]
    pub channel: String,
    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub price: f64,
}

/// Which order channels count toward usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChannelFilter {
    #[default]
    All,
    /// Lowercased channel names.
    Only(Vec<String>),
}

impl ChannelFilter {
    pub fn only<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let channels: Vec<String> = channels
            .into_iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if channels.is_empty() {
            Self::All
        } else {
            Self::Only(channels)
        }
    }

    pub fn admits(&self, channel: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(allowed) => {
                let channel = channel.trim();
                allowed.iter().any(|c| c.eq_ignore_ascii_case(channel))
            }
        }
    }
}

/// Usage totals for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consumption {
    /// Grams used, keyed by the slug the stock is held under.
    pub grams: BTreeMap<String, u64>,
    pub pieces: BTreeMap<String, u64>,
    /// Grams sold as extra/half portions, keyed by the portion's own slug.
    /// Display only; already counted in `grams`.
    pub portion_grams: BTreeMap<String, u64>,
}

impl Consumption {
    pub fn grams_for(&self, slug: &str) -> u64 {
        self.grams.get(slug).copied().unwrap_or(0)
    }

    pub fn pieces_for(&self, slug: &str) -> u64 {
        self.pieces.get(slug).copied().unwrap_or(0)
    }

    /// Remove both buckets for `slug`, returning `(grams, pieces)`.
    pub fn take(&mut self, slug: &str) -> (u64, u64) {
        (
            self.grams.remove(slug).unwrap_or(0),
            self.pieces.remove(slug).unwrap_or(0),
        )
    }

    fn add(bucket: &mut BTreeMap<String, u64>, slug: String, amount: u64) {
        let total = bucket.entry(slug).or_insert(0);
        *total = total.saturating_add(amount);
    }
}

/// Fold order lines into per-slug usage.
///
/// Resolved lines count under their item's slug and unit. Unresolved lines use
/// the inferred unit; gram lines pool under the base-food slug so portion
/// variants of an unknown dish stay on one row. Lines with a non-positive
/// quantity or a name with no letters or digits are skipped.
pub fn aggregate<'o>(
    orders: impl IntoIterator<Item = &'o Order>,
    aliases: &AliasMap<'_>,
    channels: &ChannelFilter,
) -> Consumption {
    let mut usage = Consumption::default();

    for order in orders {
        if !channels.admits(&order.channel) {
            continue;
        }
        for line in &order.items {
            if line.quantity <= 0 {
                continue;
            }
            let quantity = line.quantity.unsigned_abs();
            let raw_slug = normalize_slug(&line.name);
            if raw_slug.is_empty() {
                continue;
            }

            let (slug, unit) = match aliases.resolve_name(&line.name) {
                Some(item) => (item.slug.clone(), item.unit),
                None => {
                    let unit = infer_kind_unit(&line.name).unit;
                    let slug = match unit {
                        Unit::Gram => {
                            let base = base_food_slug(&line.name);
                            if base.is_empty() { raw_slug.clone() } else { base }
                        }
                        Unit::Piece => raw_slug.clone(),
                    };
                    (slug, unit)
                }
            };

            match unit {
                Unit::Gram => {
                    let grams = grams_for_name(&line.name).saturating_mul(quantity);
                    Consumption::add(&mut usage.grams, slug, grams);
                    if is_portion_variant(&line.name) {
                        Consumption::add(&mut usage.portion_grams, raw_slug, grams);
                    }
                }
                Unit::Piece => Consumption::add(&mut usage.pieces, slug, quantity),
            }
        }
    }

    usage
}
