use crate::config::{AppConfig, StoreConfig};
use crate::couch::CouchStore;
use crate::database::Database;
use crate::feed::PriceFeed;
use crate::models::{ListOutcome, PriceUpdate, RunError, RunSummary};
use crate::store::SnapshotStore;
use anyhow::Result;
use log::{error, info};
use reqwest::Client;

/// One pass over a single tracked list: locate the cursor (the list's
/// maximum snapshot date), load the rows at it, match tickers against the
/// feed, and rewrite the matched prices. Rows at older dates are never
/// touched; rows with no feed match keep their stored price.
pub async fn reconcile_list(
    store: &mut dyn SnapshotStore,
    list: &str,
    feed: &PriceFeed,
) -> Result<u64> {
    let Some(cursor) = store.latest_snapshot_date(list).await? else {
        info!("Table '{list}' is empty. Nothing to update.");
        return Ok(0);
    };
    info!("Updating prices for {list} from snapshot date: {cursor}");

    let rows = store.rows_at(list, cursor).await?;
    let updates: Vec<PriceUpdate> = rows
        .iter()
        .filter_map(|row| {
            feed.price(&row.ticker).map(|price| PriceUpdate {
                ticker: row.ticker.clone(),
                price,
            })
        })
        .collect();
    if updates.is_empty() {
        return Ok(0);
    }

    store.apply_price_updates(list, cursor, &updates).await
}

/// Processes every tracked list sequentially, in configuration order. A
/// failing list is logged and recorded in its outcome; the remaining lists
/// still run and the summary still counts as a completed run.
pub async fn run_lists(
    store: &mut dyn SnapshotStore,
    feed: &PriceFeed,
    lists: &[String],
) -> RunSummary {
    let mut outcomes = Vec::with_capacity(lists.len());
    for list in lists {
        match reconcile_list(store, list, feed).await {
            Ok(updated) => {
                info!("Updated prices for {updated} tickers in {list}.");
                outcomes.push(ListOutcome::updated(list, updated));
            }
            Err(err) => {
                error!("Error processing table '{list}': {err:#}");
                outcomes.push(ListOutcome::failed(list, &err));
            }
        }
    }
    RunSummary { outcomes }
}

/// Full run: validate store configuration, fetch the feed once, connect the
/// configured backend for the duration of the run, reconcile every list.
/// Only configuration, feed, and connection failures abort the run.
pub async fn execute(config: &AppConfig, http: &Client) -> Result<RunSummary, RunError> {
    let store_config = config.store.as_ref().ok_or_else(|| {
        RunError::Config("no DATABASE_URL or COUCHDB_URL secret found".to_string())
    })?;

    let feed = PriceFeed::fetch(http, &config.feed_url)
        .await
        .map_err(RunError::Feed)?;

    let mut store: Box<dyn SnapshotStore> = match store_config {
        StoreConfig::Postgres { database_url } => Box::new(
            Database::connect(database_url)
                .await
                .map_err(RunError::Store)?,
        ),
        StoreConfig::CouchDb { base_url } => Box::new(CouchStore::new(http.clone(), base_url)),
    };

    let summary = run_lists(store.as_mut(), &feed, &config.tracking_tables).await;
    Ok(summary)
}
