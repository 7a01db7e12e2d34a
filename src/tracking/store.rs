//! Append-only stock snapshot store
//!
//! In-memory per-product time series, ordered by observation timestamp.
//! There is no update or delete: a correction is a new snapshot. Writers
//! for different products never contend beyond the map lock; ordering per
//! product comes from timestamp position, not arrival order, so a late
//! out-of-order write lands in its proper place instead of being rejected.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::snapshot::StockSnapshot;

#[derive(Default)]
struct StoreInner {
    series: HashMap<String, Vec<StockSnapshot>>,
    /// Bumped per append; estimate caches key on this to invalidate
    revisions: HashMap<String, u64>,
}

/// Shared append-only snapshot log
#[derive(Clone, Default)]
pub struct StockSnapshotStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl StockSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation, placed by its timestamp within the
    /// product's series.
    pub async fn append(&self, snapshot: StockSnapshot) {
        let mut inner = self.inner.write().await;
        let series = inner
            .series
            .entry(snapshot.product_id.clone())
            .or_default();
        let position = series.partition_point(|s| s.observed_at <= snapshot.observed_at);
        let product_id = snapshot.product_id.clone();
        series.insert(position, snapshot);
        *inner.revisions.entry(product_id).or_insert(0) += 1;
    }

    /// Ordered snapshots for a product from `since` onward
    pub async fn query(&self, product_id: &str, since: DateTime<Utc>) -> Vec<StockSnapshot> {
        let inner = self.inner.read().await;
        inner
            .series
            .get(product_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.observed_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The complete ordered series for a product
    pub async fn series(&self, product_id: &str) -> Vec<StockSnapshot> {
        let inner = self.inner.read().await;
        inner.series.get(product_id).cloned().unwrap_or_default()
    }

    /// Monotonic per-product write counter; changes whenever a snapshot
    /// for that product lands.
    pub async fn revision(&self, product_id: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.revisions.get(product_id).copied().unwrap_or(0)
    }

    pub async fn product_count(&self) -> usize {
        self.inner.read().await.series.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snap(product: &str, minutes_ago: i64, stock: u32) -> StockSnapshot {
        StockSnapshot::new(
            product,
            Utc::now() - Duration::minutes(minutes_ago),
            Some(stock),
            None,
        )
    }

    #[tokio::test]
    async fn series_stays_timestamp_ordered_despite_arrival_order() {
        let store = StockSnapshotStore::new();
        store.append(snap("p1", 10, 80)).await;
        store.append(snap("p1", 30, 100)).await; // older, arrives later
        store.append(snap("p1", 1, 60)).await;

        let series = store.series("p1").await;
        let stocks: Vec<u32> = series.iter().filter_map(|s| s.stock_remaining).collect();
        assert_eq!(stocks, vec![100, 80, 60]);
    }

    #[tokio::test]
    async fn query_filters_by_window() {
        let store = StockSnapshotStore::new();
        store.append(snap("p1", 60 * 24 * 20, 100)).await;
        store.append(snap("p1", 60, 50)).await;

        let recent = store
            .query("p1", Utc::now() - Duration::days(7))
            .await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].stock_remaining, Some(50));
    }

    #[tokio::test]
    async fn revision_bumps_per_append() {
        let store = StockSnapshotStore::new();
        assert_eq!(store.revision("p1").await, 0);
        store.append(snap("p1", 5, 10)).await;
        store.append(snap("p2", 5, 10)).await;
        assert_eq!(store.revision("p1").await, 1);
        assert_eq!(store.revision("p2").await, 1);
    }
}
