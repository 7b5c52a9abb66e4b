//! In-memory adapters for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use larder_core::{CatalogItemId, DayKey, Entity, StockEntryId};
use larder_inventory::{CatalogItem, Movement, MovementType, Order, StockEntry};

use super::{AlertGate, CatalogCascade, CatalogStore, MovementLog, OrderSource, StockLedgerStore, StoreError};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<HashMap<CatalogItemId, CatalogItem>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError> {
        Ok(read(&self.inner)?.values().cloned().collect())
    }

    async fn get_item(&self, id: CatalogItemId) -> Result<Option<CatalogItem>, StoreError> {
        Ok(read(&self.inner)?.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CatalogItem>, StoreError> {
        Ok(read(&self.inner)?.values().find(|i| i.slug == slug).cloned())
    }

    async fn insert_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let mut map = write(&self.inner)?;
        if map.values().any(|i| i.slug == item.slug) {
            return Err(StoreError::Conflict(format!("slug {} already exists", item.slug)));
        }
        if map.contains_key(item.id()) {
            return Err(StoreError::Conflict(format!("item {} already exists", item.id)));
        }
        map.insert(*item.id(), item.clone());
        Ok(())
    }

    async fn update_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let mut map = write(&self.inner)?;
        check_replaceable(&map, item)?;
        map.insert(item.id, item.clone());
        Ok(())
    }
}

fn check_replaceable(map: &HashMap<CatalogItemId, CatalogItem>, item: &CatalogItem) -> Result<(), StoreError> {
    if !map.contains_key(&item.id) {
        return Err(StoreError::NotFound);
    }
    if map.values().any(|i| i.slug == item.slug && i.id != item.id) {
        return Err(StoreError::Conflict(format!("slug {} already exists", item.slug)));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    inner: RwLock<HashMap<StockEntryId, StockEntry>>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry regardless of day.
    pub fn all_entries(&self) -> Result<Vec<StockEntry>, StoreError> {
        Ok(read(&self.inner)?.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl StockLedgerStore for InMemoryStockLedger {
    async fn insert_entry(&self, entry: &StockEntry) -> Result<(), StoreError> {
        write(&self.inner)?.insert(*entry.id(), entry.clone());
        Ok(())
    }

    async fn get_entry(&self, id: StockEntryId) -> Result<Option<StockEntry>, StoreError> {
        Ok(read(&self.inner)?.get(&id).cloned())
    }

    async fn update_entry(&self, entry: &StockEntry) -> Result<(), StoreError> {
        let mut map = write(&self.inner)?;
        match map.get_mut(&entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_entry(&self, id: StockEntryId) -> Result<(), StoreError> {
        write(&self.inner)?.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn entries_for_day(&self, day: DayKey) -> Result<Vec<StockEntry>, StoreError> {
        let mut entries: Vec<StockEntry> = read(&self.inner)?
            .values()
            .filter(|e| e.day == day)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn delete_for_day(&self, day: DayKey) -> Result<u64, StoreError> {
        let mut map = write(&self.inner)?;
        let before = map.len();
        map.retain(|_, e| e.day != day);
        Ok((before - map.len()) as u64)
    }
}

/// Cascading catalog changes over an in-memory catalog and ledger pair.
///
/// Both write locks are held for the whole change (catalog first, then
/// ledger) and every check runs before anything is mutated.
#[derive(Debug, Clone)]
pub struct InMemoryCatalogCascade {
    catalog: Arc<InMemoryCatalogStore>,
    ledger: Arc<InMemoryStockLedger>,
}

impl InMemoryCatalogCascade {
    pub fn new(catalog: Arc<InMemoryCatalogStore>, ledger: Arc<InMemoryStockLedger>) -> Self {
        Self { catalog, ledger }
    }
}

#[async_trait::async_trait]
impl CatalogCascade for InMemoryCatalogCascade {
    async fn delete_with_entries(&self, item: &CatalogItem) -> Result<u64, StoreError> {
        let mut items = write(&self.catalog.inner)?;
        let mut entries = write(&self.ledger.inner)?;
        if items.remove(&item.id).is_none() {
            return Err(StoreError::NotFound);
        }
        let before = entries.len();
        entries.retain(|_, e| e.slug != item.slug);
        Ok((before - entries.len()) as u64)
    }

    async fn rename_with_entries(&self, item: &CatalogItem, previous_slug: &str) -> Result<u64, StoreError> {
        let mut items = write(&self.catalog.inner)?;
        let mut entries = write(&self.ledger.inner)?;
        check_replaceable(&items, item)?;
        items.insert(item.id, item.clone());

        let mut moved = 0;
        for entry in entries.values_mut().filter(|e| e.slug == previous_slug) {
            entry.slug = item.slug.clone();
            entry.display_name = item.name.clone();
            moved += 1;
        }
        Ok(moved)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMovementLog {
    inner: RwLock<Vec<Movement>>,
}

impl InMemoryMovementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every movement in append order, including `low_stock` witnesses.
    pub fn all(&self) -> Result<Vec<Movement>, StoreError> {
        Ok(read(&self.inner)?.clone())
    }
}

#[async_trait::async_trait]
impl MovementLog for InMemoryMovementLog {
    async fn append(&self, movement: &Movement) -> Result<(), StoreError> {
        write(&self.inner)?.push(movement.clone());
        Ok(())
    }

    async fn exists(&self, slug: &str, movement_type: MovementType) -> Result<bool, StoreError> {
        Ok(read(&self.inner)?
            .iter()
            .any(|m| m.slug == slug && m.movement_type == movement_type))
    }

    async fn listed_for_day(&self, day: DayKey, limit: usize) -> Result<Vec<Movement>, StoreError> {
        let mut rows: Vec<Movement> = read(&self.inner)?
            .iter()
            .filter(|m| m.day == day && m.movement_type.is_listed())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn record_alert(&self, movement: &Movement) -> Result<AlertGate, StoreError> {
        // Check and insert under one write lock.
        let mut log = write(&self.inner)?;
        let taken = log.iter().any(|m| {
            m.movement_type == MovementType::LowStock && m.slug == movement.slug && m.day == movement.day
        });
        if taken {
            return Ok(AlertGate::AlreadyRecorded);
        }
        log.push(movement.clone());
        Ok(AlertGate::Recorded)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderSource {
    inner: RwLock<Vec<Order>>,
}

impl InMemoryOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, order: Order) -> Result<(), StoreError> {
        write(&self.inner)?.push(order);
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrderSource for InMemoryOrderSource {
    async fn orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        Ok(read(&self.inner)?
            .iter()
            .filter(|o| o.placed_at >= start && o.placed_at < end)
            .cloned()
            .collect())
    }
}
