//! Inventory operations.
//!
//! [`InventoryService`] is the operation surface the rest of the system calls:
//! catalog maintenance, restocks and corrections, the movement feed and the
//! daily summary with low-stock alerting. Every "today" is the shop-local day
//! of the injected clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use larder_core::{CatalogItemId, Clock, DayKey, DomainError, StockEntryId};
use larder_inventory::catalog::sort_for_listing;
use larder_inventory::movement::merge_for_listing;
use larder_inventory::naming::{base_food_slug, infer_kind_unit, normalize_slug, strip_portion_words};
use larder_inventory::{
    AlertNotice, CatalogItem, CatalogPatch, ItemRef, Kind, KindUnit, Movement, MovementType,
    NewCatalogItem, StockEntry, StockEntryPatch, StockTotals, Summary, Unit, aggregate,
    build_alias_map, build_summary,
};

use crate::config::InventorySettings;
use crate::notifier::AlertNotifier;
use crate::store::{
    AlertGate, CatalogCascade, CatalogStore, InMemoryCatalogCascade, InMemoryCatalogStore, InMemoryMovementLog,
    InMemoryOrderSource, InMemoryStockLedger, MovementLog, OrderSource, PostgresInventoryStore, StockLedgerStore,
    StoreError,
};

pub const DEFAULT_MOVEMENT_LIMIT: usize = 50;
pub const MAX_MOVEMENT_LIMIT: usize = 200;

const INITIAL_STOCK_NOTE: &str = "Initial stock";

/// Typed failure of every inventory operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for InventoryError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) | DomainError::InvariantViolation(msg) => {
                InventoryError::Validation(msg)
            }
            DomainError::Conflict(msg) => InventoryError::Conflict(msg),
        }
    }
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => InventoryError::Conflict(msg),
            StoreError::NotFound => InventoryError::NotFound("record".to_string()),
            StoreError::Backend(msg) => InventoryError::Storage(msg),
        }
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Create-or-update input for a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertItem {
    pub sku: String,
    pub kind: Kind,
    pub unit: Unit,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Same-day stock recorded alongside the item.
    #[serde(default)]
    pub initial_quantity: Option<i64>,
}

impl UpsertItem {
    pub fn new(sku: impl Into<String>, kind: Kind, unit: Unit) -> Self {
        Self {
            sku: sku.into(),
            kind,
            unit,
            aliases: Vec::new(),
            initial_quantity: None,
        }
    }

    pub fn with_initial_quantity(mut self, quantity: i64) -> Self {
        self.initial_quantity = Some(quantity);
        self
    }
}

/// Restock input. At least one of `item_id`, `slug`, `sku` identifies the item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStock {
    #[serde(default)]
    pub item_id: Option<CatalogItemId>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub note: Option<String>,
    /// Used only when the item has to be auto-created.
    #[serde(default)]
    pub kind: Option<Kind>,
    #[serde(default)]
    pub unit: Option<Unit>,
}

impl AddStock {
    pub fn for_sku(sku: impl Into<String>, quantity: i64) -> Self {
        Self {
            sku: Some(sku.into()),
            quantity,
            ..Self::default()
        }
    }

    pub fn for_item(item_id: CatalogItemId, quantity: i64) -> Self {
        Self {
            item_id: Some(item_id),
            quantity,
            ..Self::default()
        }
    }

    fn item_ref(&self) -> ItemRef {
        ItemRef {
            id: self.item_id,
            slug: self.slug.clone(),
            sku: self.sku.clone(),
        }
    }
}

/// What one alerting pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertReport {
    /// Slugs whose witness was written by this pass.
    pub recorded: Vec<String>,
    /// Candidates already alerted today.
    pub already_alerted: usize,
    /// Notifications or witness writes that failed.
    pub failed: usize,
}

/// Storage handles the service works against.
#[derive(Clone)]
pub struct InventoryStores {
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn StockLedgerStore>,
    pub movements: Arc<dyn MovementLog>,
    pub orders: Arc<dyn OrderSource>,
    /// Must cover the same catalog and ledger as the two handles above.
    pub cascade: Arc<dyn CatalogCascade>,
}

impl InventoryStores {
    /// Every role served by one Postgres adapter.
    pub fn postgres(store: PostgresInventoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            catalog: store.clone(),
            ledger: store.clone(),
            movements: store.clone(),
            orders: store.clone(),
            cascade: store,
        }
    }

    /// In-memory stores, with the cascade wired over the given catalog and
    /// ledger.
    pub fn in_memory(
        catalog: Arc<InMemoryCatalogStore>,
        ledger: Arc<InMemoryStockLedger>,
        movements: Arc<InMemoryMovementLog>,
        orders: Arc<InMemoryOrderSource>,
    ) -> Self {
        Self {
            cascade: Arc::new(InMemoryCatalogCascade::new(catalog.clone(), ledger.clone())),
            catalog,
            ledger,
            movements,
            orders,
        }
    }
}

pub struct InventoryService {
    stores: InventoryStores,
    notifier: Arc<dyn AlertNotifier>,
    clock: Arc<dyn Clock>,
    settings: InventorySettings,
}

impl InventoryService {
    pub fn new(
        stores: InventoryStores,
        notifier: Arc<dyn AlertNotifier>,
        clock: Arc<dyn Clock>,
        settings: InventorySettings,
    ) -> Self {
        Self {
            stores,
            notifier,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &InventorySettings {
        &self.settings
    }

    fn now_and_today(&self) -> (DateTime<Utc>, DayKey) {
        let now = self.clock.now();
        (now, self.settings.shop_clock.day_key(now))
    }

    pub fn today(&self) -> DayKey {
        self.now_and_today().1
    }

    // ---------------------------------------------------------------------
    // Catalog
    // ---------------------------------------------------------------------

    /// Catalog sorted by kind, then name.
    pub async fn list_items(&self) -> InventoryResult<Vec<CatalogItem>> {
        let mut items = self.stores.catalog.list_items().await?;
        sort_for_listing(&mut items);
        Ok(items)
    }

    /// Create the item for `sku`'s slug, or overwrite the one already there.
    pub async fn upsert_item(&self, input: UpsertItem) -> InventoryResult<CatalogItem> {
        if let Some(q) = input.initial_quantity.filter(|q| *q < 0) {
            return Err(InventoryError::Validation(format!(
                "invalid quantity: {q} (initial quantity cannot be negative)"
            )));
        }
        let (now, today) = self.now_and_today();
        let fields = NewCatalogItem::new(input.sku, input.kind, input.unit).with_aliases(input.aliases);
        let candidate = CatalogItem::create(CatalogItemId::new(), fields.clone(), now)?;

        let item = match self.stores.catalog.find_by_slug(&candidate.slug).await? {
            Some(existing) => self.overwrite_item(existing, fields, now).await?,
            None => match self.stores.catalog.insert_item(&candidate).await {
                Ok(()) => candidate,
                // Lost a race with a concurrent upsert of the same slug.
                Err(StoreError::Conflict(_)) => {
                    let existing = self
                        .stores
                        .catalog
                        .find_by_slug(&candidate.slug)
                        .await?
                        .ok_or_else(|| InventoryError::Conflict(format!("sku {} already exists", candidate.slug)))?;
                    self.overwrite_item(existing, fields, now).await?
                }
                Err(e) => return Err(e.into()),
            },
        };

        match self.stores.movements.exists(&item.slug, MovementType::Create).await {
            Ok(true) => {}
            Ok(false) => self.audit(Movement::for_item(MovementType::Create, &item, "", today, now)).await,
            Err(e) => warn!(slug = %item.slug, error = %e, "could not check for create movement"),
        }

        if let Some(q) = input.initial_quantity.filter(|q| *q > 0) {
            let entry = StockEntry::restock(StockEntryId::new(), &item, q, INITIAL_STOCK_NOTE, today, now)?;
            self.stores.ledger.insert_entry(&entry).await?;
        }

        info!(slug = %item.slug, kind = %item.kind, unit = %item.unit, "catalog item upserted");
        Ok(item)
    }

    async fn overwrite_item(
        &self,
        mut item: CatalogItem,
        fields: NewCatalogItem,
        now: DateTime<Utc>,
    ) -> InventoryResult<CatalogItem> {
        item.overwrite(fields, now)?;
        self.stores.catalog.update_item(&item).await?;
        Ok(item)
    }

    /// Patch name/kind/unit/aliases. A rename that changes the slug takes the
    /// item's stock entries along.
    pub async fn edit_item(&self, id: CatalogItemId, patch: CatalogPatch) -> InventoryResult<CatalogItem> {
        let (now, today) = self.now_and_today();
        let current = self
            .stores
            .catalog
            .get_item(id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("item {id}")))?;

        let edit = current.patched(&patch, now)?;

        if edit.previous_slug.is_some() {
            let owner = self.stores.catalog.find_by_slug(&edit.item.slug).await?;
            edit.ensure_slug_free(owner.as_ref())?;
        }

        match &edit.previous_slug {
            Some(previous) => {
                let moved = self.stores.cascade.rename_with_entries(&edit.item, previous).await?;
                info!(from = %previous, to = %edit.item.slug, moved, "stock entries re-slugged");
            }
            None => self.stores.catalog.update_item(&edit.item).await?,
        }

        self.audit(Movement::for_item(MovementType::Edit, &edit.item, edit.note, today, now))
            .await;
        Ok(edit.item)
    }

    /// Remove an item together with all of its stock entries.
    pub async fn delete_item(&self, id: CatalogItemId) -> InventoryResult<()> {
        let (now, today) = self.now_and_today();
        let item = self
            .stores
            .catalog
            .get_item(id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("item {id}")))?;

        let removed = self.stores.cascade.delete_with_entries(&item).await?;

        let note = format!("deleted item and {removed} stock entries");
        self.audit(Movement::for_item(MovementType::Delete, &item, note, today, now))
            .await;
        info!(slug = %item.slug, removed, "catalog item deleted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Stock ledger
    // ---------------------------------------------------------------------

    /// Today's stock entries, newest first.
    pub async fn list_today_entries(&self) -> InventoryResult<Vec<StockEntry>> {
        Ok(self.stores.ledger.entries_for_day(self.today()).await?)
    }

    /// Record a restock, auto-creating the item when the sku is unknown.
    pub async fn add_stock(&self, input: AddStock) -> InventoryResult<StockEntry> {
        if input.quantity <= 0 {
            return Err(InventoryError::Validation(format!(
                "invalid quantity: {} (a positive quantity is required)",
                input.quantity
            )));
        }
        let (now, today) = self.now_and_today();

        let items = self.stores.catalog.list_items().await?;
        let resolved = build_alias_map(&items)
            .resolve(&input.item_ref())
            .map(|(item, _)| item.clone());

        let item = match resolved {
            Some(item) => item,
            None => {
                let sku = input
                    .sku
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| InventoryError::NotFound("item not found".to_string()))?;
                self.find_or_create_for_sku(sku, input.kind, input.unit, now, today)
                    .await?
            }
        };

        let note = input.note.unwrap_or_default();
        let entry = StockEntry::restock(StockEntryId::new(), &item, input.quantity, note, today, now)?;
        self.stores.ledger.insert_entry(&entry).await?;

        info!(slug = %entry.slug, quantity = entry.quantity, unit = %entry.unit, day = %today, "stock added");
        Ok(entry)
    }

    async fn find_or_create_for_sku(
        &self,
        sku: &str,
        kind: Option<Kind>,
        unit: Option<Unit>,
        now: DateTime<Utc>,
        today: DayKey,
    ) -> InventoryResult<CatalogItem> {
        let base = base_food_slug(sku);
        let plain = normalize_slug(sku);
        for slug in [&base, &plain] {
            if slug.is_empty() {
                continue;
            }
            if let Some(item) = self.stores.catalog.find_by_slug(slug).await? {
                return Ok(item);
            }
        }

        let inferred = infer_kind_unit(sku);
        let kind_unit = KindUnit::new(kind.unwrap_or(inferred.kind), unit.unwrap_or(inferred.unit));
        let name = strip_portion_words(sku);
        let item = if base.is_empty() {
            CatalogItem::create(
                CatalogItemId::new(),
                NewCatalogItem::new(name, kind_unit.kind, kind_unit.unit),
                now,
            )?
        } else {
            CatalogItem::create_base(CatalogItemId::new(), &name, sku, kind_unit, now)?
        };

        match self.stores.catalog.insert_item(&item).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                if let Some(existing) = self.stores.catalog.find_by_slug(&item.slug).await? {
                    return Ok(existing);
                }
                return Err(InventoryError::Conflict(format!("sku {} already exists", item.slug)));
            }
            Err(e) => return Err(e.into()),
        }

        self.audit(Movement::for_item(
            MovementType::Create,
            &item,
            "auto-created by stock entry",
            today,
            now,
        ))
        .await;
        info!(slug = %item.slug, kind = %item.kind, unit = %item.unit, "catalog item auto-created");
        Ok(item)
    }

    /// Correct quantity and/or note of an entry.
    pub async fn edit_entry(&self, id: StockEntryId, patch: StockEntryPatch) -> InventoryResult<StockEntry> {
        let (now, today) = self.now_and_today();
        let mut entry = self
            .stores
            .ledger
            .get_entry(id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("stock entry {id}")))?;

        let note = entry.apply_patch(&patch, now)?;
        self.stores.ledger.update_entry(&entry).await?;

        self.audit(Movement::for_entry(MovementType::EditStock, &entry, note, today, now))
            .await;
        Ok(entry)
    }

    pub async fn delete_entry(&self, id: StockEntryId) -> InventoryResult<()> {
        let (now, today) = self.now_and_today();
        let entry = self
            .stores
            .ledger
            .get_entry(id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("stock entry {id}")))?;

        self.stores.ledger.delete_entry(id).await?;

        self.audit(Movement::for_entry(
            MovementType::DeleteStock,
            &entry,
            entry.deletion_note(),
            today,
            now,
        ))
        .await;
        Ok(())
    }

    /// Clear every stock entry of the current day.
    pub async fn reset_today(&self) -> InventoryResult<u64> {
        let (now, today) = self.now_and_today();
        let cleared = self.stores.ledger.delete_for_day(today).await?;
        self.audit(Movement::reset(cleared as usize, today, now)).await;
        info!(day = %today, cleared, "today's stock reset");
        Ok(cleared)
    }

    // ---------------------------------------------------------------------
    // Movements
    // ---------------------------------------------------------------------

    /// Today's audit feed, newest first, with stock additions shown as `add`
    /// rows. `limit` is clamped to `1..=200` and defaults to 50.
    pub async fn list_movements(&self, limit: Option<usize>) -> InventoryResult<Vec<Movement>> {
        let limit = limit.unwrap_or(DEFAULT_MOVEMENT_LIMIT).clamp(1, MAX_MOVEMENT_LIMIT);
        let today = self.today();
        let stored = self.stores.movements.listed_for_day(today, limit).await?;
        let entries = self.stores.ledger.entries_for_day(today).await?;
        Ok(merge_for_listing(stored, &entries, limit))
    }

    // ---------------------------------------------------------------------
    // Summary and alerts
    // ---------------------------------------------------------------------

    /// Added/used/remaining for `day`, without side effects.
    pub async fn compute_summary(&self, day: DayKey) -> InventoryResult<Summary> {
        let (start, end) = self.settings.shop_clock.day_bounds(day);

        let items = self.stores.catalog.list_items().await?;
        let entries = self.stores.ledger.entries_for_day(day).await?;
        let orders = self.stores.orders.orders_between(start, end).await?;

        let aliases = build_alias_map(&items);
        let added = StockTotals::from_entries(&entries);
        let used = aggregate(&orders, &aliases, &self.settings.channels);

        debug!(
            day = %day,
            items = items.len(),
            entries = entries.len(),
            orders = orders.len(),
            "summary inputs loaded"
        );
        Ok(build_summary(&items, &added, &used))
    }

    /// Today's summary. Runs low-stock alerting as a side effect; alerting
    /// problems are logged and never fail the call.
    pub async fn summary(&self) -> InventoryResult<Summary> {
        let (now, today) = self.now_and_today();
        let summary = self.compute_summary(today).await?;
        let report = self.run_low_stock_alerts(&summary, today, now).await;
        if !report.recorded.is_empty() || report.failed > 0 {
            info!(
                day = %today,
                recorded = report.recorded.len(),
                already_alerted = report.already_alerted,
                failed = report.failed,
                "low stock alerting finished"
            );
        }
        Ok(summary)
    }

    /// Gate each breaching row through the daily witness, then notify the
    /// ones this pass recorded.
    pub async fn run_low_stock_alerts(&self, summary: &Summary, day: DayKey, now: DateTime<Utc>) -> AlertReport {
        let mut report = AlertReport::default();
        let candidates = self
            .settings
            .rules
            .evaluate(summary, self.settings.alerts_require_catalog_item);

        let mut notices: Vec<AlertNotice> = Vec::new();
        for candidate in &candidates {
            let row = &candidate.row;
            let witness = Movement::low_stock(&row.sku, &row.slug, row.unit, candidate.movement_note(), day, now);
            match self.stores.movements.record_alert(&witness).await {
                Ok(AlertGate::Recorded) => {
                    report.recorded.push(row.slug.clone());
                    notices.push(candidate.notice());
                }
                Ok(AlertGate::AlreadyRecorded) => {
                    debug!(slug = %row.slug, day = %day, "low stock already alerted today");
                    report.already_alerted += 1;
                }
                Err(e) => {
                    warn!(slug = %row.slug, rule = %candidate.rule, error = %e, "failed to record low stock alert");
                    report.failed += 1;
                }
            }
        }

        let recipient = self.settings.alert_recipient.as_deref();
        let results =
            futures::future::join_all(notices.iter().map(|notice| self.notifier.notify(recipient, notice))).await;
        for (notice, result) in notices.iter().zip(results) {
            if let Err(e) = result {
                warn!(slug = %notice.slug, error = %e, "low stock notification failed");
                report.failed += 1;
            }
        }

        report
    }

    /// Best-effort audit write.
    async fn audit(&self, movement: Movement) {
        if let Err(e) = self.stores.movements.append(&movement).await {
            warn!(
                kind = %movement.movement_type,
                slug = %movement.slug,
                error = %e,
                "failed to record movement"
            );
        }
    }
}
