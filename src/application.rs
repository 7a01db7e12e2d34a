//! Application layer module
//!
//! The facade that orchestrates the domain logic: collection tasks over a
//! driven browser session, batch ingestion from alternate collectors, stock
//! observation runs, and cached on-demand sales estimation.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crawl_engine::context::CollectionContext;
use crate::crawl_engine::coordinator::{CollectError, PaginationCoordinator, TaskSpec};
use crate::crawl_engine::events::TaskEvent;
use crate::domain::estimate::SalesEstimate;
use crate::domain::product::{PartialProduct, ProductDraft, ProductRecord};
use crate::domain::snapshot::StockSnapshot;
use crate::domain::task::{BatchIngestReport, CollectionSummary, KeywordPlan, SwitchMode};
use crate::infrastructure::browser::PageDriver;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::tracking::estimator::{ProductFacts, SalesEstimator};
use crate::tracking::store::StockSnapshotStore;
use crate::tracking::tracker::{
    ComposerObservationSource, ObservationSource, StockTracker, TrackReport,
};

/// Handle to a running collection session: the record stream, the summary
/// future, and cancellation.
pub struct CollectionHandle {
    /// Completed records as they merge
    pub records: ReceiverStream<ProductRecord>,
    /// One summary per keyword task, in plan order
    pub summaries: JoinHandle<Vec<CollectionSummary>>,
    context: CollectionContext,
}

impl CollectionHandle {
    /// Request cancellation; already-merged records still flush.
    pub fn cancel(&self) {
        self.context.cancel();
    }

    /// Subscribe to task progress events
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<TaskEvent> {
        self.context.subscribe()
    }
}

/// Handle to a running observation job
pub struct TrackingHandle {
    /// Snapshots as they are appended
    pub snapshots: ReceiverStream<StockSnapshot>,
    /// Final run report
    pub report: JoinHandle<TrackReport>,
    token: CancellationToken,
}

impl TrackingHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

struct PulseState {
    config: Arc<AppConfig>,
    store: StockSnapshotStore,
    estimator: SalesEstimator,
    /// Working set of merged records, fed by collection and ingestion
    records: RwLock<HashMap<String, ProductDraft>>,
    facts: RwLock<HashMap<String, ProductFacts>>,
    /// Estimate cache keyed by the store's per-product revision
    estimate_cache: RwLock<HashMap<String, (u64, SalesEstimate)>>,
}

impl PulseState {
    async fn remember_record(&self, record: &ProductRecord) {
        let facts = ProductFacts {
            created_at: record.creation_date,
            price: (record.price > 0.0).then_some(record.price),
            fallback_review_count: record.review_count,
        };
        self.facts.write().await.insert(record.sku.clone(), facts);
    }
}

/// The collection & estimation engine facade
#[derive(Clone)]
pub struct OzonPulse {
    state: Arc<PulseState>,
}

impl OzonPulse {
    pub fn new(config: AppConfig) -> Self {
        let estimator = SalesEstimator::new(config.advanced.estimation.clone());
        Self {
            state: Arc::new(PulseState {
                config: Arc::new(config),
                store: StockSnapshotStore::new(),
                estimator,
                records: RwLock::new(HashMap::new()),
                facts: RwLock::new(HashMap::new()),
                estimate_cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }

    pub fn store(&self) -> &StockSnapshotStore {
        &self.state.store
    }

    /// Collect products for one keyword, streaming records as they merge.
    pub fn collect_by_keyword<D: PageDriver + 'static>(
        &self,
        driver: D,
        keyword: impl Into<String>,
        max_items: u32,
        deep_collect: bool,
    ) -> Result<CollectionHandle, CollectError> {
        let plan = KeywordPlan {
            keywords: vec![keyword.into()],
            max_items_per_keyword: max_items,
            deep_collect,
            switch: SwitchMode::Sequential,
        };
        self.collect_plan(driver, plan)
    }

    /// Collect products for a multi-keyword plan, sequentially within one
    /// browser session.
    pub fn collect_plan<D: PageDriver + 'static>(
        &self,
        driver: D,
        plan: KeywordPlan,
    ) -> Result<CollectionHandle, CollectError> {
        let (context, _events) = CollectionContext::new(Arc::clone(&self.state.config));
        let mut coordinator = PaginationCoordinator::new(driver, context.clone())?;

        let (inner_tx, mut inner_rx) = mpsc::channel::<ProductRecord>(64);
        let (out_tx, out_rx) = mpsc::channel::<ProductRecord>(64);

        // Tee the record stream through the working set
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(record) = inner_rx.recv().await {
                state.remember_record(&record).await;
                if out_tx.send(record).await.is_err() {
                    break;
                }
            }
        });

        let switch_context = context.clone();
        let summaries = tokio::spawn(async move {
            let mut results = Vec::with_capacity(plan.keywords.len());
            let keyword_count = plan.keywords.len();
            for (index, keyword) in plan.keywords.iter().enumerate() {
                if switch_context.is_cancelled() {
                    break;
                }
                let max_items = match plan.switch {
                    SwitchMode::Quantity { items } => items.min(plan.max_items_per_keyword),
                    _ => plan.max_items_per_keyword,
                };
                let spec = TaskSpec {
                    keyword: keyword.clone(),
                    max_items,
                    deep_collect: plan.deep_collect,
                };

                let task_started = Utc::now();
                let summary = coordinator.run(spec, inner_tx.clone()).await;
                results.push(summary);

                // Timer mode keeps each keyword's slot occupied for the
                // full interval before moving on
                if let SwitchMode::Timer { minutes } = plan.switch {
                    let elapsed = Utc::now() - task_started;
                    let slot = chrono::Duration::minutes(i64::from(minutes));
                    if elapsed < slot {
                        let remaining = (slot - elapsed)
                            .to_std()
                            .unwrap_or_default();
                        tokio::select! {
                            () = tokio::time::sleep(remaining) => {},
                            () = switch_context.cancellation_token().cancelled() => break,
                        }
                    }
                }

                if index + 1 < keyword_count {
                    let advanced = &switch_context.config.advanced;
                    if !switch_context
                        .paced_sleep(advanced.keyword_switch_min_ms, advanced.keyword_switch_max_ms)
                        .await
                    {
                        break;
                    }
                }
            }
            coordinator.shutdown().await;
            results
        });

        Ok(CollectionHandle {
            records: ReceiverStream::new(out_rx),
            summaries,
            context,
        })
    }

    /// Merge a batch of partially-populated payloads from an alternate
    /// collector through the same left-biased rules as live collection.
    /// Returns the resolved records alongside merge/discard counts.
    pub async fn ingest_batch(
        &self,
        payloads: Vec<PartialProduct>,
    ) -> (Vec<ProductRecord>, BatchIngestReport) {
        let mut report = BatchIngestReport::default();
        let mut touched: Vec<String> = Vec::new();
        {
            let mut records = self.state.records.write().await;
            for payload in payloads {
                if !payload.has_identity() {
                    report.discarded += 1;
                    continue;
                }
                let sku = payload.sku.clone();
                records
                    .entry(sku.clone())
                    .or_insert_with(|| ProductDraft::new(sku.clone()))
                    .absorb(payload);
                report.merged += 1;
                if !touched.contains(&sku) {
                    touched.push(sku);
                }
            }
        }
        if report.discarded > 0 {
            warn!("batch ingest discarded {} payloads without SKU", report.discarded);
        }

        let mut merged_records = Vec::with_capacity(touched.len());
        let records = self.state.records.read().await;
        for sku in touched {
            if let Some(draft) = records.get(&sku) {
                let record = draft.resolved("", Utc::now());
                self.state.remember_record(&record).await;
                merged_records.push(record);
            }
        }
        (merged_records, report)
    }

    /// Observe stock/review state for the given products, appending one
    /// snapshot each and streaming them as they land.
    pub fn track_stock(&self, product_ids: Vec<String>) -> anyhow::Result<TrackingHandle> {
        let http = HttpClient::new(self.state.config.advanced.network.clone())?;
        let source: Arc<dyn ObservationSource> = Arc::new(ComposerObservationSource::new(
            http,
            self.state.config.user.base_url.clone(),
        ));
        self.track_stock_with_source(product_ids, source)
    }

    /// Observation run over a custom source (tests, alternate transports).
    pub fn track_stock_with_source(
        &self,
        product_ids: Vec<String>,
        source: Arc<dyn ObservationSource>,
    ) -> anyhow::Result<TrackingHandle> {
        let token = CancellationToken::new();
        let tracker = StockTracker::new(source, self.state.store.clone(), &self.state.config);
        let (tx, rx) = mpsc::channel(64);

        let run_token = token.clone();
        let report = tokio::spawn(async move {
            let report = tracker.track(&product_ids, tx, &run_token).await;
            info!(
                "stock tracking run: {}/{} products observed",
                report.succeeded, report.total
            );
            report
        });

        Ok(TrackingHandle {
            snapshots: ReceiverStream::new(rx),
            report,
            token,
        })
    }

    /// Estimate sales for one product from its snapshot series. Pure read:
    /// no side effects on stored snapshots. Cached until the next snapshot
    /// for the product arrives.
    pub async fn estimate_sales(&self, product_id: &str) -> SalesEstimate {
        let revision = self.state.store.revision(product_id).await;
        if let Some((cached_revision, cached)) =
            self.state.estimate_cache.read().await.get(product_id)
        {
            if *cached_revision == revision {
                return cached.clone();
            }
        }

        let snapshots = self.state.store.series(product_id).await;
        let facts = self
            .state
            .facts
            .read()
            .await
            .get(product_id)
            .cloned()
            .unwrap_or_default();
        let estimate = self
            .state
            .estimator
            .estimate(product_id, &snapshots, &facts, Utc::now());

        self.state
            .estimate_cache
            .write()
            .await
            .insert(product_id.to_string(), (revision, estimate.clone()));
        estimate
    }

    /// Copy the derived sales fields onto a product record (what the
    /// persistence collaborator stores).
    pub async fn apply_estimate(&self, record: &mut ProductRecord) {
        let estimate = self.estimate_sales(&record.sku).await;
        record.weekly_sales = estimate.weekly_sales;
        record.monthly_sales = estimate.monthly_sales;
        record.sales_estimate_method = estimate.method;
        record.sales_confidence = estimate.confidence;
        record.monthly_gmv = estimate.monthly_gmv.unwrap_or(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::SourceFidelity;

    fn payload(sku: &str, source: SourceFidelity, title: &str) -> PartialProduct {
        PartialProduct {
            sku: sku.into(),
            title: title.into(),
            ..PartialProduct::new(source)
        }
    }

    #[tokio::test]
    async fn batch_ingest_merges_and_counts_discards() {
        let pulse = OzonPulse::new(AppConfig::default());
        let (records, report) = pulse
            .ingest_batch(vec![
                payload("100500", SourceFidelity::BatchImport, "batch title"),
                payload("", SourceFidelity::BatchImport, "no identity"),
                payload("100500", SourceFidelity::DetailApi, "detail title"),
            ])
            .await;

        assert_eq!(report.merged, 2);
        assert_eq!(report.discarded, 1);
        assert_eq!(records.len(), 1);
        // Left-biased by fidelity: detail beats batch import
        assert_eq!(records[0].title, "detail title");
    }

    #[tokio::test]
    async fn estimate_cache_invalidates_on_new_snapshot() {
        let pulse = OzonPulse::new(AppConfig::default());

        let first = pulse.estimate_sales("p1").await;
        assert_eq!(first.monthly_sales, 0);

        pulse
            .store()
            .append(StockSnapshot::new("p1", Utc::now() - chrono::Duration::hours(2), Some(100), None))
            .await;
        pulse
            .store()
            .append(StockSnapshot::new("p1", Utc::now(), Some(60), None))
            .await;

        let second = pulse.estimate_sales("p1").await;
        assert_eq!(second.monthly_sales, 40);

        // Unchanged revision returns the cached estimate
        let third = pulse.estimate_sales("p1").await;
        assert_eq!(third, second);
    }
}
