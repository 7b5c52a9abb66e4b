//! Postgres-backed storage.
//!
//! One adapter implements all four storage traits over a shared pool. Queries
//! are runtime-checked (`sqlx::query`) so the crate builds without a live
//! database.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::{instrument, warn};
use uuid::Uuid;

use larder_core::{CatalogItemId, DayKey, MovementId, StockEntryId};
use larder_inventory::{CatalogItem, Kind, Movement, MovementType, Order, OrderLine, StockEntry, Unit};

use super::{AlertGate, CatalogCascade, CatalogStore, MovementLog, OrderSource, StockLedgerStore, StoreError};

/// Schema for the inventory tables. Idempotent.
pub const MIGRATION: &str = include_str!("../../migrations/001_inventory.sql");

#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Apply the bundled schema.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresInventoryStore {
    #[instrument(skip(self), err)]
    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, slug, kind, unit, aliases, created_at, updated_at
            FROM inventory_items
            ORDER BY kind ASC, name ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn get_item(&self, id: CatalogItemId) -> Result<Option<CatalogItem>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, slug, kind, unit, aliases, created_at, updated_at
            FROM inventory_items
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_slug(&self, slug: &str) -> Result<Option<CatalogItem>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, slug, kind, unit, aliases, created_at, updated_at
            FROM inventory_items
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_slug", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self, item), fields(slug = %item.slug), err)]
    async fn insert_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (id, name, slug, kind, unit, aliases, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.slug)
        .bind(item.kind.as_str())
        .bind(item.unit.as_str())
        .bind(item.aliases.as_slice())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self, item), fields(slug = %item.slug), err)]
    async fn update_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let result = update_item_query(item)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StockLedgerStore for PostgresInventoryStore {
    #[instrument(skip(self, entry), fields(slug = %entry.slug), err)]
    async fn insert_entry(&self, entry: &StockEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_stock
                (id, slug, display_name, unit, quantity, day_key, note, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(&entry.slug)
        .bind(&entry.display_name)
        .bind(entry.unit.as_str())
        .bind(quantity_to_db(entry.quantity)?)
        .bind(entry.day.date())
        .bind(&entry.note)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_entry(&self, id: StockEntryId) -> Result<Option<StockEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, slug, display_name, unit, quantity, day_key, note, created_at, updated_at
            FROM inventory_stock
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_entry", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    #[instrument(skip(self, entry), fields(id = %entry.id), err)]
    async fn update_entry(&self, entry: &StockEntry) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_stock
            SET quantity = $2, note = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(quantity_to_db(entry.quantity)?)
        .bind(&entry.note)
        .bind(entry.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_entry", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_entry(&self, id: StockEntryId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM inventory_stock WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_entry", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, day), fields(day = %day), err)]
    async fn entries_for_day(&self, day: DayKey) -> Result<Vec<StockEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, slug, display_name, unit, quantity, day_key, note, created_at, updated_at
            FROM inventory_stock
            WHERE day_key = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(day.date())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("entries_for_day", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    #[instrument(skip(self, day), fields(day = %day), err)]
    async fn delete_for_day(&self, day: DayKey) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM inventory_stock WHERE day_key = $1")
            .bind(day.date())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_for_day", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl CatalogCascade for PostgresInventoryStore {
    #[instrument(skip(self, item), fields(slug = %item.slug), err)]
    async fn delete_with_entries(&self, item: &CatalogItem) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let entries = sqlx::query("DELETE FROM inventory_stock WHERE slug = $1")
            .bind(&item.slug)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_stock_for_item", e))?;

        let deleted = sqlx::query("DELETE FROM inventory_items WHERE id = $1")
            .bind(item.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;

        // Dropping the transaction rolls the stock deletion back.
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(entries.rows_affected())
    }

    #[instrument(skip(self, item), fields(from = %previous_slug, to = %item.slug), err)]
    async fn rename_with_entries(&self, item: &CatalogItem, previous_slug: &str) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = update_item_query(item)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_item", e))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let moved = sqlx::query(
            r#"
            UPDATE inventory_stock
            SET slug = $2, display_name = $3
            WHERE slug = $1
            "#,
        )
        .bind(previous_slug)
        .bind(&item.slug)
        .bind(&item.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("move_stock_slug", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(moved.rows_affected())
    }
}

#[async_trait::async_trait]
impl MovementLog for PostgresInventoryStore {
    #[instrument(skip(self, movement), fields(kind = %movement.movement_type, slug = %movement.slug), err)]
    async fn append(&self, movement: &Movement) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, movement_type, sku, slug, unit, note, day_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(&movement.sku)
        .bind(&movement.slug)
        .bind(movement.unit.map(Unit::as_str))
        .bind(&movement.note)
        .bind(movement.day.date())
        .bind(movement.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn exists(&self, slug: &str, movement_type: MovementType) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM inventory_movements WHERE slug = $1 AND movement_type = $2
            ) AS present
            "#,
        )
        .bind(slug)
        .bind(movement_type.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movement_exists", e))?;

        row.try_get("present").map_err(decode_error)
    }

    #[instrument(skip(self, day), fields(day = %day), err)]
    async fn listed_for_day(&self, day: DayKey, limit: usize) -> Result<Vec<Movement>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT id, movement_type, sku, slug, unit, note, day_key, created_at
            FROM inventory_movements
            WHERE day_key = $1 AND movement_type <> 'low_stock'
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(day.date())
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("listed_for_day", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self, movement), fields(slug = %movement.slug, day = %movement.day), err)]
    async fn record_alert(&self, movement: &Movement) -> Result<AlertGate, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, movement_type, sku, slug, unit, note, day_key, created_at)
            VALUES ($1, 'low_stock', $2, $3, $4, $5, $6, $7)
            ON CONFLICT (slug, day_key) WHERE movement_type = 'low_stock' DO NOTHING
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(&movement.sku)
        .bind(&movement.slug)
        .bind(movement.unit.map(Unit::as_str))
        .bind(&movement.note)
        .bind(movement.day.date())
        .bind(movement.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_alert", e))?;

        Ok(if result.rows_affected() == 1 {
            AlertGate::Recorded
        } else {
            AlertGate::AlreadyRecorded
        })
    }
}

#[async_trait::async_trait]
impl OrderSource for PostgresInventoryStore {
    #[instrument(skip(self), err)]
    async fn orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id::text AS id, COALESCE(order_type, '') AS order_type, created_at, items
            FROM orders
            WHERE created_at >= $1 AND created_at < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("orders_between", e))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(decode_error)?;
            let items: Option<JsonValue> = row.try_get("items").map_err(decode_error)?;
            orders.push(Order {
                items: items.map(|v| lines_from_json(&id, &v)).unwrap_or_default(),
                id,
                channel: row.try_get("order_type").map_err(decode_error)?,
                placed_at: row.try_get("created_at").map_err(decode_error)?,
            });
        }
        Ok(orders)
    }
}

/// Order documents are written by other services; read line items leniently.
/// Quantities may arrive as integers, floats or numeric strings.
fn lines_from_json(order_id: &str, items: &JsonValue) -> Vec<OrderLine> {
    let Some(array) = items.as_array() else {
        warn!(order_id, "order items is not an array; skipping order");
        return Vec::new();
    };
    array
        .iter()
        .map(|li| OrderLine {
            name: li.get("name").and_then(JsonValue::as_str).unwrap_or_default().to_string(),
            quantity: li.get("quantity").map(json_number).unwrap_or(0.0) as i64,
            price: li.get("price").map(json_number).unwrap_or(0.0),
        })
        .collect()
}

fn json_number(v: &JsonValue) -> f64 {
    match v {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn update_item_query(item: &CatalogItem) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        UPDATE inventory_items
        SET name = $2, slug = $3, kind = $4, unit = $5, aliases = $6, updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(item.id.as_uuid())
    .bind(&item.name)
    .bind(&item.slug)
    .bind(item.kind.as_str())
    .bind(item.unit.as_str())
    .bind(item.aliases.as_slice())
    .bind(item.updated_at)
}

fn item_from_row(row: &PgRow) -> Result<CatalogItem, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let unit: String = row.try_get("unit").map_err(decode_error)?;
    Ok(CatalogItem {
        id: CatalogItemId::from_uuid(id),
        name: row.try_get("name").map_err(decode_error)?,
        slug: row.try_get("slug").map_err(decode_error)?,
        kind: kind.parse::<Kind>().map_err(|e| StoreError::Backend(e.to_string()))?,
        unit: unit.parse::<Unit>().map_err(|e| StoreError::Backend(e.to_string()))?,
        aliases: row.try_get("aliases").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<StockEntry, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let unit: String = row.try_get("unit").map_err(decode_error)?;
    let quantity: i64 = row.try_get("quantity").map_err(decode_error)?;
    let day: NaiveDate = row.try_get("day_key").map_err(decode_error)?;
    Ok(StockEntry {
        id: StockEntryId::from_uuid(id),
        slug: row.try_get("slug").map_err(decode_error)?,
        display_name: row.try_get("display_name").map_err(decode_error)?,
        unit: unit.parse::<Unit>().map_err(|e| StoreError::Backend(e.to_string()))?,
        quantity: u64::try_from(quantity)
            .map_err(|_| StoreError::Backend(format!("negative stock quantity {quantity} in entry {id}")))?,
        day: DayKey::new(day),
        note: row.try_get("note").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let movement_type: String = row.try_get("movement_type").map_err(decode_error)?;
    let unit: Option<String> = row.try_get("unit").map_err(decode_error)?;
    let day: NaiveDate = row.try_get("day_key").map_err(decode_error)?;
    Ok(Movement {
        id: MovementId::from_uuid(id),
        movement_type: movement_type
            .parse::<MovementType>()
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        sku: row.try_get("sku").map_err(decode_error)?,
        slug: row.try_get("slug").map_err(decode_error)?,
        unit: unit
            .map(|u| u.parse::<Unit>())
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        note: row.try_get("note").map_err(decode_error)?,
        day: DayKey::new(day),
        created_at: row.try_get("created_at").map_err(decode_error)?,
    })
}

fn quantity_to_db(quantity: u64) -> Result<i64, StoreError> {
    i64::try_from(quantity).map_err(|_| StoreError::Backend(format!("quantity {quantity} exceeds BIGINT")))
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_lines_are_read_leniently() {
        let items = json!([
            {"name": "Jollof Rice", "quantity": 2, "price": 2500},
            {"name": "Coke", "quantity": "3", "price": "500"},
            {"name": "Water"},
            {"quantity": 1}
        ]);
        let lines = lines_from_json("o1", &items);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[1].quantity, 3);
        assert_eq!(lines[1].price, 500.0);
        assert_eq!(lines[2].quantity, 0);
        assert_eq!(lines[3].name, "");
    }

    #[test]
    fn non_array_items_yield_no_lines() {
        assert!(lines_from_json("o1", &json!({"name": "Coke"})).is_empty());
    }

    #[test]
    fn migration_declares_daily_alert_gate() {
        assert!(MIGRATION.contains("WHERE movement_type = 'low_stock'"));
        assert!(MIGRATION.contains("inventory_items_slug_key"));
    }
}
