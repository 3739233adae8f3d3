use crate::models::{PriceUpdate, SnapshotRow};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Storage capability the reconciler needs from a backend. The algorithm
/// never branches on which implementation it is handed.
///
/// `apply_price_updates` must touch only rows at the given date; updates
/// for one list land as a single unit as far as the backend allows
/// (transaction for Postgres, one bulk request for CouchDB).
#[async_trait]
pub trait SnapshotStore: Send {
    /// Maximum `snapshot_date` present in the list, `None` when the list
    /// holds no rows.
    async fn latest_snapshot_date(&self, list: &str) -> Result<Option<NaiveDate>>;

    /// Every row whose `snapshot_date` equals `date`.
    async fn rows_at(&self, list: &str, date: NaiveDate) -> Result<Vec<SnapshotRow>>;

    /// Rewrites the `Price` field of the rows identified by each update's
    /// ticker and `date`, returning the number of rows actually updated.
    async fn apply_price_updates(
        &mut self,
        list: &str,
        date: NaiveDate,
        updates: &[PriceUpdate],
    ) -> Result<u64>;
}
