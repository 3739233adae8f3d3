use crate::config::is_valid_list_name;
use crate::models::{PriceUpdate, SnapshotRow};
use crate::store::SnapshotStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::error;
use serde_json::Map;
use tokio_postgres::{Client, NoTls};

/// PostgreSQL snapshot store. One connection per run; dropping the struct
/// releases it.
pub struct Database {
    client: Client,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("failed to connect to PostgreSQL")?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self { client })
    }
}

/// Table names come from configuration and are interpolated into SQL, so
/// they must be plain identifiers.
fn checked_table(list: &str) -> Result<&str> {
    if is_valid_list_name(list) {
        Ok(list)
    } else {
        Err(anyhow!("invalid tracking table name: {}", list))
    }
}

#[async_trait]
impl SnapshotStore for Database {
    async fn latest_snapshot_date(&self, list: &str) -> Result<Option<NaiveDate>> {
        let table = checked_table(list)?;
        let row = self
            .client
            .query_one(&format!("SELECT MAX(snapshot_date) FROM {table}"), &[])
            .await
            .with_context(|| format!("failed to query latest snapshot date for {list}"))?;
        Ok(row.get::<_, Option<NaiveDate>>(0))
    }

    async fn rows_at(&self, list: &str, date: NaiveDate) -> Result<Vec<SnapshotRow>> {
        let table = checked_table(list)?;
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT \"Ticker\", \"Price\", snapshot_date FROM {table} \
                     WHERE snapshot_date = $1"
                ),
                &[&date],
            )
            .await
            .with_context(|| format!("failed to load snapshot rows for {list}"))?;

        Ok(rows
            .into_iter()
            .map(|row| SnapshotRow {
                ticker: row.get(0),
                price: row.get(1),
                snapshot_date: row.get(2),
                extra: Map::new(),
            })
            .collect())
    }

    async fn apply_price_updates(
        &mut self,
        list: &str,
        date: NaiveDate,
        updates: &[PriceUpdate],
    ) -> Result<u64> {
        let table = checked_table(list)?;
        let update_sql = format!(
            "UPDATE {table} SET \"Price\" = $1 WHERE \"Ticker\" = $2 AND snapshot_date = $3"
        );

        let tx = self
            .client
            .transaction()
            .await
            .with_context(|| format!("failed to open transaction for {list}"))?;
        let statement = tx
            .prepare(&update_sql)
            .await
            .with_context(|| format!("failed to prepare price update for {list}"))?;

        let mut updated = 0u64;
        for update in updates {
            updated += tx
                .execute(&statement, &[&update.price, &update.ticker, &date])
                .await
                .with_context(|| {
                    format!("failed to update price for {} in {}", update.ticker, list)
                })?;
        }

        tx.commit()
            .await
            .with_context(|| format!("failed to commit price updates for {list}"))?;
        Ok(updated)
    }
}
