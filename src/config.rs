use anyhow::{anyhow, Result};
use std::env;

pub const DEFAULT_FEED_URL: &str = "https://companiesmarketcap.com/?download=csv";
const DEFAULT_PORT: u16 = 8080;

/// The fixed set of tracked lists maintained by the screening job.
const DEFAULT_TRACKING_TABLES: [&str; 4] = [
    "magic_formula_buys_track",
    "magic_formula_sells_track",
    "intelligent_investor_buys_track",
    "combined_model_buys_track",
];

/// Which persistence backend holds the snapshot rows. Postgres wins when
/// both URLs are set.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres { database_url: String },
    CouchDb { base_url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Absent store credentials are not fatal at startup; the run reports
    /// a configuration error when triggered, matching the endpoint's
    /// 500-on-missing-secret behavior.
    pub store: Option<StoreConfig>,
    pub feed_url: String,
    pub tracking_tables: Vec<String>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let store = if let Ok(database_url) = env::var("DATABASE_URL") {
            Some(StoreConfig::Postgres { database_url })
        } else if let Ok(base_url) = env::var("COUCHDB_URL") {
            Some(StoreConfig::CouchDb { base_url })
        } else {
            None
        };

        let feed_url =
            env::var("PRICE_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());

        let tracking_tables = parse_tracking_tables(env::var("TRACKING_TABLES").ok())?;

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| anyhow!("PORT must be a number (value: {})", raw))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            store,
            feed_url,
            tracking_tables,
            port,
        })
    }
}

/// Comma-separated override of the tracked list names, defaulting to the
/// screener's four tables. Names are interpolated into SQL identifiers and
/// CouchDB database paths, so they must be plain identifiers.
pub fn parse_tracking_tables(raw: Option<String>) -> Result<Vec<String>> {
    let tables: Vec<String> = match raw {
        Some(value) => value
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
        None => DEFAULT_TRACKING_TABLES
            .iter()
            .map(|name| name.to_string())
            .collect(),
    };

    if tables.is_empty() {
        return Err(anyhow!("TRACKING_TABLES must name at least one table"));
    }
    for name in &tables {
        if !is_valid_list_name(name) {
            return Err(anyhow!("invalid tracking table name: {}", name));
        }
    }
    Ok(tables)
}

pub fn is_valid_list_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
