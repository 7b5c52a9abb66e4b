//! Prints the daily inventory summary as JSON.
//!
//! Usage: `larder-report [YYYY-MM-DD]`. Without a day the current shop day is
//! reported and low-stock alerting runs; a past day is a read-only recompute.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use larder_core::{DayKey, SystemClock};
use larder_infra::store::PostgresInventoryStore;
use larder_infra::{InventoryConfig, InventoryService, InventoryStores, TracingNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    larder_observability::init();

    let day = std::env::args()
        .nth(1)
        .map(|raw| raw.parse::<DayKey>().with_context(|| format!("invalid day {raw:?}")))
        .transpose()?;

    let config = InventoryConfig::from_env().context("loading inventory configuration")?;
    let settings = config.settings()?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .context("connecting to postgres")?;

    let store = PostgresInventoryStore::new(pool);
    store.migrate().await.context("applying inventory schema")?;

    let service = InventoryService::new(
        InventoryStores::postgres(store),
        Arc::new(TracingNotifier),
        Arc::new(SystemClock),
        settings,
    );

    let summary = match day {
        Some(day) => service.compute_summary(day).await?,
        None => service.summary().await?,
    };
    tracing::info!(day = %day.unwrap_or_else(|| service.today()), rows = summary.rows().count(), "summary computed");

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
