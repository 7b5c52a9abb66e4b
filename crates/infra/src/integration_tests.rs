//! Integration tests for the inventory service.
//!
//! Tests: restock / orders → summary → low-stock gate → notifier
//!
//! Verifies:
//! - Portion variants and unknown names reconcile as operators expect
//! - Alerts fire at most once per item per shop-local day
//! - Catalog edits keep the ledger consistent (cascade, re-slug, conflicts)
//! - Audit movements are written for every mutation

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, Utc};

    use larder_core::{CatalogItemId, Clock, FixedClock, StockEntryId};
    use larder_inventory::{
        AlertNotice, CatalogPatch, Kind, MovementType, Order, OrderLine, StockEntryPatch, Unit,
    };

    use crate::config::InventoryConfig;
    use crate::notifier::{AlertNotifier, NotifyError};
    use crate::service::{AddStock, InventoryError, InventoryService, InventoryStores, UpsertItem};
    use crate::store::{InMemoryCatalogStore, InMemoryMovementLog, InMemoryOrderSource, InMemoryStockLedger};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<AlertNotice>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn subjects(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|n| n.subject.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl AlertNotifier for RecordingNotifier {
        async fn notify(&self, _recipient: Option<&str>, notice: &AlertNotice) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Delivery("smtp unavailable".into()));
            }
            self.sent.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    struct Harness {
        service: InventoryService,
        ledger: Arc<InMemoryStockLedger>,
        movements: Arc<InMemoryMovementLog>,
        orders: Arc<InMemoryOrderSource>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<FixedClock>,
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn setup_with(config: InventoryConfig, notifier: RecordingNotifier) -> Harness {
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let ledger = Arc::new(InMemoryStockLedger::new());
        let movements = Arc::new(InMemoryMovementLog::new());
        let orders = Arc::new(InMemoryOrderSource::new());
        let notifier = Arc::new(notifier);
        // 11:00 in the shop (UTC+1).
        let clock = Arc::new(FixedClock::new(utc("2024-05-01T10:00:00Z")));

        let stores = InventoryStores::in_memory(catalog, ledger.clone(), movements.clone(), orders.clone());
        let service = InventoryService::new(stores, notifier.clone(), clock.clone(), config.settings().unwrap());

        Harness {
            service,
            ledger,
            movements,
            orders,
            notifier,
            clock,
        }
    }

    fn setup() -> Harness {
        setup_with(InventoryConfig::default(), RecordingNotifier::default())
    }

    impl Harness {
        fn order(&self, channel: &str, lines: &[(&str, i64)]) {
            let order = Order {
                id: format!("order-{}", self.clock.now().timestamp_millis()),
                channel: channel.to_string(),
                placed_at: self.clock.now(),
                items: lines
                    .iter()
                    .map(|(name, quantity)| OrderLine {
                        name: name.to_string(),
                        quantity: *quantity,
                        price: 2000.0,
                    })
                    .collect(),
            };
            self.orders.push(order).unwrap();
        }

        fn movement_types(&self) -> Vec<MovementType> {
            self.movements.all().unwrap().iter().map(|m| m.movement_type).collect()
        }

        fn low_stock_count(&self) -> usize {
            self.movement_types()
                .into_iter()
                .filter(|t| *t == MovementType::LowStock)
                .count()
        }
    }

    #[tokio::test]
    async fn extra_portions_deduct_from_base_dish() {
        let h = setup();
        h.service
            .upsert_item(UpsertItem::new("Jollof Rice", Kind::Food, Unit::Gram).with_initial_quantity(5000))
            .await
            .unwrap();
        h.order("dine-in", &[("Jollof Rice Extra", 2)]);

        let summary = h.service.summary().await.unwrap();
        let row = summary.row("jollofrice").unwrap();
        assert_eq!((row.added, row.used, row.remaining), (5000, 350, 4650));

        let extra = summary.food.iter().find(|r| r.informational).unwrap();
        assert_eq!(extra.slug, "jollofriceextra");
        assert_eq!(extra.used, 350);
        assert!(h.notifier.subjects().is_empty());
    }

    #[tokio::test]
    async fn unknown_drink_is_reported_but_not_alerted() {
        let h = setup();
        h.order("delivery", &[("Coke", 3)]);

        let summary = h.service.summary().await.unwrap();
        let row = &summary.drinks[0];
        assert_eq!(row.slug, "coke");
        assert_eq!(row.kind, Kind::Drink);
        assert_eq!((row.added, row.used, row.remaining), (0, 3, 0));
        assert!(!row.configured);

        assert_eq!(h.low_stock_count(), 0);
        assert!(h.notifier.subjects().is_empty());
    }

    #[tokio::test]
    async fn low_stock_alert_fires_once_per_shop_day() {
        let h = setup();
        h.service
            .upsert_item(UpsertItem::new("Fried Rice", Kind::Food, Unit::Gram).with_initial_quantity(1500))
            .await
            .unwrap();
        h.order("dine-in", &[("Fried Rice", 2)]);

        let summary = h.service.summary().await.unwrap();
        assert_eq!(summary.row("friedrice").unwrap().remaining, 800);
        assert_eq!(h.notifier.subjects(), vec!["Low Stock: Fried Rice - 800 g left (today)"]);
        assert_eq!(h.low_stock_count(), 1);

        h.clock.advance(Duration::hours(2));
        h.service.summary().await.unwrap();
        assert_eq!(h.low_stock_count(), 1);
        assert_eq!(h.notifier.subjects().len(), 1);

        // Next shop day: nothing restocked yet, so the rice is flagged again.
        h.clock.advance(Duration::days(1));
        let summary = h.service.summary().await.unwrap();
        assert_eq!(summary.row("friedrice").unwrap().added, 0);
        assert_eq!(h.low_stock_count(), 2);
        assert_eq!(h.notifier.subjects().len(), 2);
    }

    #[tokio::test]
    async fn alert_witness_is_recorded_even_when_delivery_fails() {
        let h = setup_with(InventoryConfig::default(), RecordingNotifier::failing());
        h.service
            .upsert_item(UpsertItem::new("Turkey", Kind::Protein, Unit::Piece).with_initial_quantity(2))
            .await
            .unwrap();

        let summary = h.service.summary().await.unwrap();
        assert_eq!(summary.proteins[0].remaining, 2);
        assert_eq!(h.low_stock_count(), 1);

        h.service.summary().await.unwrap();
        assert_eq!(h.low_stock_count(), 1);
    }

    #[tokio::test]
    async fn unconfigured_rows_alert_when_catalog_identity_not_required() {
        let config = InventoryConfig {
            alerts_require_catalog_item: false,
            ..InventoryConfig::default()
        };
        let h = setup_with(config, RecordingNotifier::default());
        h.order("dine-in", &[("Coke", 3)]);

        h.service.summary().await.unwrap();
        assert_eq!(h.notifier.subjects(), vec!["Low Stock: coke - 0 pcs left (today)"]);
    }

    #[tokio::test]
    async fn ambiguous_order_line_is_charged_to_the_same_item_every_time() {
        let names = ["Native Rice", "Jollof Rice", "Fried Rice"];
        for rotation in 0..names.len() {
            let h = setup();
            for name in names.iter().cycle().skip(rotation).take(names.len()) {
                h.service
                    .upsert_item(UpsertItem::new(*name, Kind::Food, Unit::Gram).with_initial_quantity(5000))
                    .await
                    .unwrap();
            }
            h.order("dine-in", &[("Rice", 1)]);

            let summary = h.service.compute_summary(h.service.today()).await.unwrap();
            let charged: Vec<&str> = summary
                .food
                .iter()
                .filter(|r| r.used > 0)
                .map(|r| r.slug.as_str())
                .collect();
            assert_eq!(charged, vec!["friedrice"], "rotation {rotation}");
        }
    }

    #[tokio::test]
    async fn channel_filter_limits_usage() {
        let config = InventoryConfig {
            order_channels: vec!["Delivery".into()],
            ..InventoryConfig::default()
        };
        let h = setup_with(config, RecordingNotifier::default());
        h.service
            .upsert_item(UpsertItem::new("Coke", Kind::Drink, Unit::Piece).with_initial_quantity(24))
            .await
            .unwrap();
        h.order("delivery", &[("Coke", 2)]);
        h.order("dine-in", &[("Coke", 5)]);

        let summary = h.service.summary().await.unwrap();
        assert_eq!(summary.row("coke").unwrap().used, 2);
    }

    #[tokio::test]
    async fn delete_item_cascades_to_stock_entries() {
        let h = setup();
        let item = h
            .service
            .upsert_item(UpsertItem::new("Moi Moi", Kind::Food, Unit::Piece).with_initial_quantity(10))
            .await
            .unwrap();
        h.service.add_stock(AddStock::for_sku("moi-moi", 5)).await.unwrap();
        assert_eq!(h.ledger.all_entries().unwrap().len(), 2);

        h.service.delete_item(item.id).await.unwrap();

        assert!(h.ledger.all_entries().unwrap().is_empty());
        assert!(h.service.list_items().await.unwrap().is_empty());
        assert!(h.movement_types().contains(&MovementType::Delete));
        assert!(matches!(
            h.service.delete_item(item.id).await,
            Err(InventoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rename_onto_existing_slug_is_rejected() {
        let h = setup();
        h.service
            .upsert_item(UpsertItem::new("Fried Rice", Kind::Food, Unit::Gram))
            .await
            .unwrap();
        let jollof = h
            .service
            .upsert_item(UpsertItem::new("Jollof Rice", Kind::Food, Unit::Gram))
            .await
            .unwrap();

        let err = h
            .service
            .edit_item(jollof.id, CatalogPatch::rename("fried-rice"))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));

        let names: Vec<_> = h
            .service
            .list_items()
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.name, i.slug))
            .collect();
        assert!(names.contains(&("Jollof Rice".to_string(), "jollofrice".to_string())));
        assert!(!h.movement_types().contains(&MovementType::Edit));
    }

    #[tokio::test]
    async fn rename_moves_stock_entries_to_new_slug() {
        let h = setup();
        let item = h
            .service
            .upsert_item(UpsertItem::new("Jollof Rice", Kind::Food, Unit::Gram).with_initial_quantity(5000))
            .await
            .unwrap();

        let renamed = h
            .service
            .edit_item(item.id, CatalogPatch::rename("Party Jollof"))
            .await
            .unwrap();
        assert_eq!(renamed.slug, "partyjollof");

        let entries = h.service.list_today_entries().await.unwrap();
        assert_eq!(entries[0].slug, "partyjollof");
        assert_eq!(entries[0].display_name, "Party Jollof");

        let summary = h.service.summary().await.unwrap();
        assert_eq!(summary.row("partyjollof").unwrap().added, 5000);
        assert!(summary.row("jollofrice").is_none());

        let edit = h
            .movements
            .all()
            .unwrap()
            .into_iter()
            .find(|m| m.movement_type == MovementType::Edit)
            .unwrap();
        assert!(edit.note.starts_with("Edited: "));
    }

    #[tokio::test]
    async fn restock_of_unknown_portion_creates_base_item() {
        let h = setup();
        let entry = h
            .service
            .add_stock(AddStock::for_sku("Ofada Rice Extra", 2000))
            .await
            .unwrap();
        assert_eq!(entry.slug, "ofadarice");
        assert_eq!(entry.display_name, "Ofada Rice");
        assert_eq!(entry.unit, Unit::Gram);

        let items = h.service.list_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, Kind::Food);
        assert!(h.movement_types().contains(&MovementType::Create));

        h.service.add_stock(AddStock::for_sku("ofada rice", 500)).await.unwrap();
        assert_eq!(h.service.list_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restock_uses_requested_kind_and_unit_for_new_items() {
        let h = setup();
        let input = AddStock {
            kind: Some(Kind::Drink),
            unit: Some(Unit::Piece),
            ..AddStock::for_sku("Chivita", 12)
        };
        let entry = h.service.add_stock(input).await.unwrap();
        assert_eq!(entry.unit, Unit::Piece);
        assert_eq!(h.service.list_items().await.unwrap()[0].kind, Kind::Drink);
    }

    #[tokio::test]
    async fn restock_rejects_bad_input_before_writing() {
        let h = setup();
        for quantity in [0, -3] {
            let err = h
                .service
                .add_stock(AddStock::for_sku("Beans", quantity))
                .await
                .unwrap_err();
            assert!(matches!(err, InventoryError::Validation(_)));
        }
        assert!(h.service.list_items().await.unwrap().is_empty());

        let err = h
            .service
            .add_stock(AddStock::for_item(CatalogItemId::new(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn entry_corrections_are_audited() {
        let h = setup();
        let entry = h
            .service
            .add_stock(AddStock {
                kind: Some(Kind::Drink),
                unit: Some(Unit::Piece),
                ..AddStock::for_sku("Coke", 100)
            })
            .await
            .unwrap();

        let edited = h
            .service
            .edit_entry(
                entry.id,
                StockEntryPatch {
                    quantity: Some(120),
                    note: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.quantity, 120);

        let err = h
            .service
            .edit_entry(
                entry.id,
                StockEntryPatch {
                    quantity: Some(-1),
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));

        h.service.delete_entry(entry.id).await.unwrap();
        assert!(matches!(
            h.service.delete_entry(entry.id).await,
            Err(InventoryError::NotFound(_))
        ));
        assert!(matches!(
            h.service.edit_entry(StockEntryId::new(), StockEntryPatch::default()).await,
            Err(InventoryError::NotFound(_))
        ));

        let notes: Vec<(MovementType, String)> = h
            .movements
            .all()
            .unwrap()
            .into_iter()
            .filter(|m| m.slug == "coke")
            .map(|m| (m.movement_type, m.note))
            .collect();
        assert!(notes.contains(&(MovementType::EditStock, "edit qty:100->120".to_string())));
        assert!(notes.contains(&(MovementType::DeleteStock, "deleted +120 piece".to_string())));
    }

    #[tokio::test]
    async fn movement_feed_merges_additions_newest_first() {
        let h = setup();
        h.service
            .upsert_item(UpsertItem::new("Coke", Kind::Drink, Unit::Piece))
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(1));
        h.service.add_stock(AddStock::for_sku("Coke", 1)).await.unwrap();
        h.clock.advance(Duration::minutes(1));
        // Remaining 1 < 3 writes a low_stock witness, which the feed hides.
        h.service.summary().await.unwrap();
        assert_eq!(h.low_stock_count(), 1);

        let feed = h.service.list_movements(None).await.unwrap();
        let types: Vec<_> = feed.iter().map(|m| m.movement_type).collect();
        assert_eq!(types, vec![MovementType::Add, MovementType::Create]);
        assert_eq!(feed[0].note, "+1 piece");

        assert_eq!(h.service.list_movements(Some(0)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_slug() {
        let h = setup();
        let first = h
            .service
            .upsert_item(UpsertItem::new("Coke", Kind::Drink, Unit::Piece))
            .await
            .unwrap();
        let second = h
            .service
            .upsert_item(UpsertItem::new("COKE ", Kind::Drink, Unit::Piece))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "COKE");
        assert_eq!(h.service.list_items().await.unwrap().len(), 1);
        let creates = h
            .movement_types()
            .into_iter()
            .filter(|t| *t == MovementType::Create)
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn upsert_rejects_blank_sku_and_negative_initial_stock() {
        let h = setup();
        assert!(matches!(
            h.service.upsert_item(UpsertItem::new("  ", Kind::Food, Unit::Gram)).await,
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            h.service
                .upsert_item(UpsertItem::new("Beans", Kind::Food, Unit::Gram).with_initial_quantity(-5))
                .await,
            Err(InventoryError::Validation(_))
        ));
        assert!(h.service.list_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_only_today() {
        let h = setup();
        h.service.add_stock(AddStock::for_sku("Coke", 5)).await.unwrap();
        h.clock.advance(Duration::days(1));
        h.service.add_stock(AddStock::for_sku("Coke", 7)).await.unwrap();
        h.service.add_stock(AddStock::for_sku("Fanta", 7)).await.unwrap();

        assert_eq!(h.service.reset_today().await.unwrap(), 2);
        assert!(h.service.list_today_entries().await.unwrap().is_empty());
        assert_eq!(h.ledger.all_entries().unwrap().len(), 1);

        let reset = h
            .movements
            .all()
            .unwrap()
            .into_iter()
            .find(|m| m.movement_type == MovementType::Reset)
            .unwrap();
        assert_eq!(reset.slug, "*");
    }

    #[tokio::test]
    async fn day_is_cut_at_shop_midnight() {
        let h = setup();
        // 23:30 UTC is 00:30 the next day in the shop.
        h.clock.set(utc("2024-05-01T23:30:00Z"));
        let entry = h.service.add_stock(AddStock::for_sku("Coke", 5)).await.unwrap();
        assert_eq!(entry.day.to_string(), "2024-05-02");
        assert_eq!(h.service.today().to_string(), "2024-05-02");
    }
}
