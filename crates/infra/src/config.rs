//! Configuration loading and representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use larder_core::ShopClock;
use larder_inventory::{ChannelFilter, LowStockRule, LowStockRules, default_rules};

pub const ENV_UTC_OFFSET_MINUTES: &str = "INVENTORY_UTC_OFFSET_MINUTES";
pub const ENV_ORDER_CHANNELS: &str = "INVENTORY_ORDER_CHANNELS";
pub const ENV_ALERTS_REQUIRE_CATALOG_ITEM: &str = "INVENTORY_ALERTS_REQUIRE_CATALOG_ITEM";
pub const ENV_LOW_STOCK_RULES: &str = "INVENTORY_LOW_STOCK_RULES";
pub const ENV_ALERT_RECIPIENT: &str = "INVENTORY_ALERT_RECIPIENT";

/// West Africa Time, where the shop trades.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Shop-local timezone as minutes east of UTC.
    pub utc_offset_minutes: i32,
    /// Order channels that count toward usage; empty means all.
    pub order_channels: Vec<String>,
    /// Only alert on rows that have a catalog entry.
    pub alerts_require_catalog_item: bool,
    pub low_stock_rules: Vec<LowStockRule>,
    pub alert_recipient: Option<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            order_channels: Vec::new(),
            alerts_require_catalog_item: true,
            low_stock_rules: default_rules(),
            alert_recipient: None,
        }
    }
}

/// Validated, ready-to-use form of [`InventoryConfig`].
#[derive(Debug, Clone)]
pub struct InventorySettings {
    pub shop_clock: ShopClock,
    pub channels: ChannelFilter,
    pub rules: LowStockRules,
    pub alerts_require_catalog_item: bool,
    pub alert_recipient: Option<String>,
}

impl InventoryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_UTC_OFFSET_MINUTES) {
            config.utc_offset_minutes = raw
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_UTC_OFFSET_MINUTES, format!("{raw:?}: {e}")))?;
        }
        if let Some(raw) = get(ENV_ORDER_CHANNELS) {
            config.order_channels = raw
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = get(ENV_ALERTS_REQUIRE_CATALOG_ITEM) {
            config.alerts_require_catalog_item = parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid(ENV_ALERTS_REQUIRE_CATALOG_ITEM, format!("{raw:?} is not a boolean")))?;
        }
        if let Some(raw) = get(ENV_LOW_STOCK_RULES) {
            config.low_stock_rules = serde_json::from_str(&raw)
                .map_err(|e| ConfigError::invalid(ENV_LOW_STOCK_RULES, e.to_string()))?;
        }
        config.alert_recipient = get(ENV_ALERT_RECIPIENT);

        config.settings()?;
        Ok(config)
    }

    pub fn settings(&self) -> Result<InventorySettings, ConfigError> {
        let shop_clock = ShopClock::from_offset_minutes(self.utc_offset_minutes)
            .map_err(|e| ConfigError::invalid(ENV_UTC_OFFSET_MINUTES, e.to_string()))?;
        let rules = LowStockRules::compile(self.low_stock_rules.clone())
            .map_err(|e| ConfigError::invalid(ENV_LOW_STOCK_RULES, e.to_string()))?;
        Ok(InventorySettings {
            shop_clock,
            channels: ChannelFilter::only(&self.order_channels),
            rules,
            alerts_require_catalog_item: self.alerts_require_catalog_item,
            alert_recipient: self.alert_recipient.clone(),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
