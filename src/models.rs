use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One persisted screening row. Field names match the schema written by the
/// external screening job (`Ticker`, `Price`, `snapshot_date`); everything
/// else the screener stored rides along in `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Price")]
    pub price: f64,
    pub snapshot_date: NaiveDate,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SnapshotRow {
    pub fn new(ticker: &str, price: f64, snapshot_date: NaiveDate) -> Self {
        Self {
            ticker: ticker.to_string(),
            price,
            snapshot_date,
            extra: Map::new(),
        }
    }
}

/// A matched (ticker, new price) pair for one list at its cursor date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub ticker: String,
    pub price: f64,
}

/// Per-list result of a run: the number of rows updated, or the rendered
/// error when that list failed. A failed list never aborts the run.
#[derive(Debug, Clone)]
pub struct ListOutcome {
    pub list: String,
    pub result: Result<u64, String>,
}

impl ListOutcome {
    pub fn updated(list: &str, count: u64) -> Self {
        Self {
            list: list.to_string(),
            result: Ok(count),
        }
    }

    pub fn failed(list: &str, err: &anyhow::Error) -> Self {
        Self {
            list: list.to_string(),
            result: Err(format!("{err:#}")),
        }
    }
}

/// Ordered per-list outcomes for one reconciliation run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcomes: Vec<ListOutcome>,
}

impl RunSummary {
    pub fn total_updated(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .sum()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|outcome| outcome.result.is_err())
    }

    /// Plain-text rendering used as the HTTP response body and CLI output.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.outcomes.len() + 1);
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(count) => lines.push(format!("{}: updated {} tickers", outcome.list, count)),
                Err(err) => lines.push(format!("{}: failed ({})", outcome.list, err)),
            }
        }
        lines.push("Price update script completed successfully.".to_string());
        lines.join("\n")
    }
}

/// Top-level failures that abort the whole run before any list is touched.
/// Per-list failures are not part of this taxonomy; they live in
/// [`ListOutcome`] and the run still reports success.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("price feed error: {0:#}")]
    Feed(anyhow::Error),
    #[error("store connection error: {0:#}")]
    Store(anyhow::Error),
}
