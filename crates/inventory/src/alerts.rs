//! Low-stock rules and alert texts.
//!
//! Evaluation is pure: it only picks candidate rows. Deduplication against
//! the day's `low_stock` movements and dispatch happen at the service layer.

use regex::Regex;
use serde::{Deserialize, Serialize};

use larder_core::{DomainError, DomainResult};

use crate::catalog::{Kind, Unit};
use crate::naming::normalize_slug;
use crate::summary::{Summary, SummaryRow};

/// One threshold rule as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockRule {
    pub label: String,
    pub unit: Unit,
    #[serde(default)]
    pub kind: Option<Kind>,
    /// Regex tested against the normalized sku.
    #[serde(default)]
    pub name_pattern: Option<String>,
    /// Alert when `remaining < below`.
    pub below: u64,
}

impl LowStockRule {
    pub fn new(label: impl Into<String>, unit: Unit, below: u64) -> Self {
        Self {
            label: label.into(),
            unit,
            kind: None,
            name_pattern: None,
            below,
        }
    }

    pub fn for_kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }
}

/// Rules shipped by default: rice under 900g, moi moi or plantain under 3,
/// any drink or protein under 3.
pub fn default_rules() -> Vec<LowStockRule> {
    vec![
        LowStockRule::new("Rice (grams) < 900g", Unit::Gram, 900)
            .for_kind(Kind::Food)
            .matching("friedrice|jollofrice|nativerice"),
        LowStockRule::new("MoiMoi/Plantain < 3 pcs", Unit::Piece, 3)
            .for_kind(Kind::Food)
            .matching("moimoi|moimo|moi|plantain|dodo"),
        LowStockRule::new("Any Drink < 3 pcs", Unit::Piece, 3).for_kind(Kind::Drink),
        LowStockRule::new("Any Protein < 3 pcs", Unit::Piece, 3).for_kind(Kind::Protein),
    ]
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: LowStockRule,
    pattern: Option<Regex>,
}

impl CompiledRule {
    fn matches(&self, row: &SummaryRow) -> bool {
        if row.unit != self.rule.unit || row.remaining >= self.rule.below {
            return false;
        }
        if self.rule.kind.is_some_and(|k| k != row.kind) {
            return false;
        }
        match &self.pattern {
            Some(re) => re.is_match(&normalize_slug(&row.sku)),
            None => true,
        }
    }
}

/// Validated rule table. The first matching rule wins for a row.
#[derive(Debug, Clone)]
pub struct LowStockRules {
    rules: Vec<CompiledRule>,
}

impl LowStockRules {
    pub fn compile(rules: Vec<LowStockRule>) -> DomainResult<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = match rule.name_pattern.as_deref() {
                    Some(p) => Some(Regex::new(p).map_err(|e| {
                        DomainError::validation(format!("rule {:?}: invalid name pattern: {e}", rule.label))
                    })?),
                    None => None,
                };
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rows that breach a threshold.
    ///
    /// Informational rows never qualify. Unconfigured rows qualify only when
    /// `require_catalog_item` is false.
    pub fn evaluate(&self, summary: &Summary, require_catalog_item: bool) -> Vec<LowStockCandidate> {
        summary
            .rows()
            .filter(|row| !row.informational)
            .filter(|row| row.configured || !require_catalog_item)
            .filter_map(|row| {
                self.rules.iter().find(|r| r.matches(row)).map(|r| LowStockCandidate {
                    row: row.clone(),
                    rule: r.rule.label.clone(),
                })
            })
            .collect()
    }
}

/// A row that crossed a threshold, with the rule that flagged it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowStockCandidate {
    pub row: SummaryRow,
    pub rule: String,
}

impl LowStockCandidate {
    fn remaining_text(&self) -> String {
        format!("{} {}", self.row.remaining, self.row.unit.abbreviation())
    }

    /// Note stored on the `low_stock` movement.
    pub fn movement_note(&self) -> String {
        format!("remaining={} ({})", self.row.remaining, self.rule)
    }

    pub fn notice(&self) -> AlertNotice {
        let remaining = self.remaining_text();
        AlertNotice {
            slug: self.row.slug.clone(),
            subject: format!("Low Stock: {} - {} left (today)", self.row.sku, remaining),
            body: format!(
                "Low Stock Alert\n\nItem: {}\nRemaining today: {}\nRule: {}\n\nThis alert is sent once per day per item.\n",
                self.row.sku, remaining, self.rule
            ),
        }
    }
}

/// Plain-text notification handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertNotice {
    pub slug: String,
    pub subject: String,
    pub body: String,
}
