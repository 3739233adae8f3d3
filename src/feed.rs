use anyhow::{anyhow, Context, Result};
use log::info;
use reqwest::Client;
use std::collections::HashMap;

const SYMBOL_COLUMN: &str = "Symbol";
const PRICE_COLUMN: &str = "price (USD)";

/// Live ticker→price mapping built once per run from the bulk feed CSV.
/// A feed failure aborts the whole run; it is never swallowed per list.
#[derive(Debug, Clone, Default)]
pub struct PriceFeed {
    prices: HashMap<String, f64>,
}

impl PriceFeed {
    pub async fn fetch(http: &Client, url: &str) -> Result<Self> {
        info!("Fetching live market cap and price data...");
        let response = http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to download price feed from {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("price feed request returned {status}"));
        }
        let body = response
            .text()
            .await
            .context("failed to read price feed body")?;

        let feed = Self::parse(&body)?;
        info!("Loaded {} live prices", feed.len());
        Ok(feed)
    }

    /// Parses the feed CSV, keeping only the symbol and USD price columns.
    /// When the feed repeats a ticker, the first occurrence wins; rows with
    /// a missing or non-numeric price are skipped entirely.
    pub fn parse(csv_text: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader
            .headers()
            .context("price feed is missing a header row")?
            .clone();
        let symbol_idx = headers
            .iter()
            .position(|header| header == SYMBOL_COLUMN)
            .ok_or_else(|| anyhow!("price feed has no '{SYMBOL_COLUMN}' column"))?;
        let price_idx = headers
            .iter()
            .position(|header| header == PRICE_COLUMN)
            .ok_or_else(|| anyhow!("price feed has no '{PRICE_COLUMN}' column"))?;

        let mut prices = HashMap::new();
        for record in reader.records() {
            let record = record.context("malformed price feed row")?;
            let Some(symbol) = record
                .get(symbol_idx)
                .map(str::trim)
                .filter(|symbol| !symbol.is_empty())
            else {
                continue;
            };
            let Some(price) = record
                .get(price_idx)
                .and_then(|raw| raw.trim().parse::<f64>().ok())
            else {
                continue;
            };
            prices.entry(symbol.to_string()).or_insert(price);
        }

        Ok(Self { prices })
    }

    pub fn price(&self, ticker: &str) -> Option<f64> {
        self.prices.get(ticker).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, f64)> for PriceFeed {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}
