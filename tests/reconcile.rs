use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use price_refresher::feed::PriceFeed;
use price_refresher::models::{PriceUpdate, SnapshotRow};
use price_refresher::reconciler::{reconcile_list, run_lists};
use price_refresher::store::SnapshotStore;
use std::collections::HashMap;
use std::sync::Once;

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = dotenvy::dotenv();
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid test date")
}

fn feed(pairs: &[(&str, f64)]) -> PriceFeed {
    pairs
        .iter()
        .map(|(ticker, price)| (ticker.to_string(), *price))
        .collect()
}

/// In-memory snapshot store with the same contract as the real backends,
/// plus optional failure injection for one list's update step.
#[derive(Default, Clone)]
struct MemoryStore {
    lists: HashMap<String, Vec<SnapshotRow>>,
    fail_updates_for: Option<String>,
}

impl MemoryStore {
    fn with_rows(list: &str, rows: Vec<SnapshotRow>) -> Self {
        let mut store = Self::default();
        store.lists.insert(list.to_string(), rows);
        store
    }

    fn insert(&mut self, list: &str, rows: Vec<SnapshotRow>) {
        self.lists.insert(list.to_string(), rows);
    }

    fn rows(&self, list: &str) -> &[SnapshotRow] {
        self.lists.get(list).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn latest_snapshot_date(&self, list: &str) -> Result<Option<NaiveDate>> {
        Ok(self
            .lists
            .get(list)
            .and_then(|rows| rows.iter().map(|row| row.snapshot_date).max()))
    }

    async fn rows_at(&self, list: &str, at: NaiveDate) -> Result<Vec<SnapshotRow>> {
        Ok(self
            .rows(list)
            .iter()
            .filter(|row| row.snapshot_date == at)
            .cloned()
            .collect())
    }

    async fn apply_price_updates(
        &mut self,
        list: &str,
        at: NaiveDate,
        updates: &[PriceUpdate],
    ) -> Result<u64> {
        if self.fail_updates_for.as_deref() == Some(list) {
            return Err(anyhow!("injected store failure for {list}"));
        }
        let rows = self
            .lists
            .get_mut(list)
            .ok_or_else(|| anyhow!("unknown list {list}"))?;
        let mut updated = 0u64;
        for update in updates {
            for row in rows
                .iter_mut()
                .filter(|row| row.ticker == update.ticker && row.snapshot_date == at)
            {
                row.price = update.price;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[tokio::test]
async fn empty_list_reports_zero_updates() {
    ensure_test_env();
    let mut store = MemoryStore::with_rows("magic_formula_buys_track", vec![]);

    let updated = reconcile_list(
        &mut store,
        "magic_formula_buys_track",
        &feed(&[("AAPL", 150.0)]),
    )
    .await
    .unwrap();

    assert_eq!(updated, 0);
}

#[tokio::test]
async fn only_latest_snapshot_is_mutated() {
    ensure_test_env();
    let mut store = MemoryStore::with_rows(
        "magic_formula_buys_track",
        vec![
            SnapshotRow::new("AAPL", 140.0, date("2024-01-01")),
            SnapshotRow::new("GOOG", 2800.0, date("2024-01-01")),
            SnapshotRow::new("AAPL", 100.0, date("2023-01-01")),
        ],
    );
    let live = feed(&[("AAPL", 150.0), ("MSFT", 300.0)]);

    let updated = reconcile_list(&mut store, "magic_formula_buys_track", &live)
        .await
        .unwrap();

    assert_eq!(updated, 1);
    let rows = store.rows("magic_formula_buys_track");
    let at = |ticker: &str, day: &str| {
        rows.iter()
            .find(|row| row.ticker == ticker && row.snapshot_date == date(day))
            .unwrap()
            .price
    };
    assert_eq!(at("AAPL", "2024-01-01"), 150.0);
    // No feed match: stored price untouched.
    assert_eq!(at("GOOG", "2024-01-01"), 2800.0);
    // Older snapshot: immutable history.
    assert_eq!(at("AAPL", "2023-01-01"), 100.0);
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    ensure_test_env();
    let mut store = MemoryStore::with_rows(
        "combined_model_buys_track",
        vec![
            SnapshotRow::new("AAPL", 140.0, date("2024-01-01")),
            SnapshotRow::new("MSFT", 290.0, date("2024-01-01")),
        ],
    );
    let live = feed(&[("AAPL", 150.0), ("MSFT", 300.0)]);

    reconcile_list(&mut store, "combined_model_buys_track", &live)
        .await
        .unwrap();
    let after_first: Vec<f64> = store
        .rows("combined_model_buys_track")
        .iter()
        .map(|row| row.price)
        .collect();

    let updated = reconcile_list(&mut store, "combined_model_buys_track", &live)
        .await
        .unwrap();
    let after_second: Vec<f64> = store
        .rows("combined_model_buys_track")
        .iter()
        .map(|row| row.price)
        .collect();

    // The second pass rewrites the same values.
    assert_eq!(updated, 2);
    assert_eq!(after_first, after_second);
    assert_eq!(after_first, vec![150.0, 300.0]);
}

#[tokio::test]
async fn one_failing_list_does_not_block_the_others() {
    ensure_test_env();
    let mut store = MemoryStore::default();
    store.insert(
        "list_a",
        vec![SnapshotRow::new("AAPL", 140.0, date("2024-01-01"))],
    );
    store.insert(
        "list_b",
        vec![SnapshotRow::new("MSFT", 290.0, date("2024-01-01"))],
    );
    store.insert(
        "list_c",
        vec![SnapshotRow::new("NVDA", 480.0, date("2024-01-01"))],
    );
    store.fail_updates_for = Some("list_b".to_string());

    let live = feed(&[("AAPL", 150.0), ("MSFT", 300.0), ("NVDA", 500.0)]);
    let lists: Vec<String> = ["list_a", "list_b", "list_c"]
        .iter()
        .map(|name| name.to_string())
        .collect();

    let summary = run_lists(&mut store, &live, &lists).await;

    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(summary.outcomes[0].list, "list_a");
    assert_eq!(summary.outcomes[0].result, Ok(1));
    assert!(summary.outcomes[1].result.is_err());
    assert_eq!(summary.outcomes[2].result, Ok(1));
    assert_eq!(summary.total_updated(), 2);
    assert!(summary.has_failures());

    // Lists before and after the failure were still written.
    assert_eq!(store.rows("list_a")[0].price, 150.0);
    assert_eq!(store.rows("list_b")[0].price, 290.0);
    assert_eq!(store.rows("list_c")[0].price, 500.0);

    // The run still renders as completed; per-list failure lives in the body.
    let text = summary.to_text();
    assert!(text.contains("list_b: failed"));
    assert!(text.ends_with("Price update script completed successfully."));
}

#[tokio::test]
async fn unknown_list_yields_a_no_op() {
    ensure_test_env();
    let mut store = MemoryStore::default();

    let updated = reconcile_list(&mut store, "never_created_track", &feed(&[("AAPL", 150.0)]))
        .await
        .unwrap();

    assert_eq!(updated, 0);
}

#[tokio::test]
async fn feed_without_matches_leaves_every_row_alone() {
    ensure_test_env();
    let rows = vec![
        SnapshotRow::new("AAPL", 140.0, date("2024-01-01")),
        SnapshotRow::new("GOOG", 2800.0, date("2024-01-01")),
    ];
    let mut store = MemoryStore::with_rows("intelligent_investor_buys_track", rows.clone());

    let updated = reconcile_list(
        &mut store,
        "intelligent_investor_buys_track",
        &feed(&[("TSLA", 250.0)]),
    )
    .await
    .unwrap();

    assert_eq!(updated, 0);
    let after = store.rows("intelligent_investor_buys_track");
    for (before, after) in rows.iter().zip(after) {
        assert_eq!(before.price, after.price);
        assert_eq!(before.snapshot_date, after.snapshot_date);
    }
}
