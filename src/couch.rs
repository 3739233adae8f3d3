use crate::config::is_valid_list_name;
use crate::models::{PriceUpdate, SnapshotRow};
use crate::store::SnapshotStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

// Mango queries return 25 docs unless told otherwise; snapshots are far
// larger than that.
const FIND_LIMIT: u64 = 100_000;

/// CouchDB snapshot store. One database per tracked list; documents carry
/// the same `Ticker`/`Price`/`snapshot_date` fields the screener writes,
/// plus CouchDB's `_id`/`_rev`.
pub struct CouchStore {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct FindResponse {
    docs: Vec<Value>,
}

#[derive(Deserialize)]
struct BulkDocResult {
    id: Option<String>,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl CouchStore {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn db_url(&self, list: &str) -> Result<String> {
        if !is_valid_list_name(list) {
            return Err(anyhow!("invalid tracking list name: {}", list));
        }
        Ok(format!("{}/{}", self.base_url, list))
    }

    async fn find(&self, list: &str, body: Value) -> Result<Vec<Value>> {
        let url = format!("{}/_find", self.db_url(list)?);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("_find request failed for {list}"))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("_find on {list} returned {status}: {detail}"));
        }
        let parsed: FindResponse = response
            .json()
            .await
            .with_context(|| format!("unreadable _find response for {list}"))?;
        Ok(parsed.docs)
    }

    /// Raw documents at the cursor date, `_id`/`_rev` included, for bulk
    /// rewriting.
    async fn docs_at(&self, list: &str, date: NaiveDate) -> Result<Vec<Value>> {
        self.find(
            list,
            json!({
                "selector": { "snapshot_date": { "$eq": date.to_string() } },
                "limit": FIND_LIMIT,
            }),
        )
        .await
    }
}

/// Rewrites the `Price` field of every doc whose ticker has a new price,
/// dropping docs with no matching update.
fn rewrite_prices(docs: Vec<Value>, prices: &HashMap<&str, f64>) -> Vec<Value> {
    docs.into_iter()
        .filter_map(|mut doc| {
            let price = doc
                .get("Ticker")
                .and_then(Value::as_str)
                .and_then(|ticker| prices.get(ticker).copied())?;
            doc["Price"] = json!(price);
            Some(doc)
        })
        .collect()
}

#[async_trait]
impl SnapshotStore for CouchStore {
    async fn latest_snapshot_date(&self, list: &str) -> Result<Option<NaiveDate>> {
        let docs = self
            .find(
                list,
                json!({
                    "selector": { "snapshot_date": { "$gt": null } },
                    "sort": [{ "snapshot_date": "desc" }],
                    "fields": ["snapshot_date"],
                    "limit": 1,
                }),
            )
            .await?;

        let Some(doc) = docs.first() else {
            return Ok(None);
        };
        let raw = doc
            .get("snapshot_date")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("document in {list} has no snapshot_date"))?;
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("unparseable snapshot_date '{raw}' in {list}"))?;
        Ok(Some(date))
    }

    async fn rows_at(&self, list: &str, date: NaiveDate) -> Result<Vec<SnapshotRow>> {
        let docs = self.docs_at(list, date).await?;
        docs.into_iter()
            .map(|doc| {
                serde_json::from_value(doc)
                    .with_context(|| format!("malformed snapshot document in {list}"))
            })
            .collect()
    }

    async fn apply_price_updates(
        &mut self,
        list: &str,
        date: NaiveDate,
        updates: &[PriceUpdate],
    ) -> Result<u64> {
        // Re-read so each doc carries its current _rev.
        let docs = self.docs_at(list, date).await?;
        let prices: HashMap<&str, f64> = updates
            .iter()
            .map(|update| (update.ticker.as_str(), update.price))
            .collect();
        let changed = rewrite_prices(docs, &prices);
        if changed.is_empty() {
            return Ok(0);
        }

        let url = format!("{}/_bulk_docs", self.db_url(list)?);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "docs": changed }))
            .send()
            .await
            .with_context(|| format!("_bulk_docs request failed for {list}"))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("_bulk_docs on {list} returned {status}: {detail}"));
        }

        let results: Vec<BulkDocResult> = response
            .json()
            .await
            .with_context(|| format!("unreadable _bulk_docs response for {list}"))?;
        let mut updated = 0u64;
        for result in results {
            if result.ok.unwrap_or(false) {
                updated += 1;
            } else if let Some(error) = result.error {
                warn!(
                    "Document {} in {} not updated: {}",
                    result.id.as_deref().unwrap_or("<unknown>"),
                    list,
                    error
                );
            }
        }
        Ok(updated)
    }
}
