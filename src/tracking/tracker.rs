//! Periodic stock observation job
//!
//! Visits each tracked product through an [`ObservationSource`] and appends
//! one immutable snapshot per visit. The default source reads the
//! page-composition API over plain rate-limited HTTP - no browser session
//! needed for observation runs. A failed product is counted and skipped;
//! the run itself only stops on cancellation.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::crawl_engine::retry::RetryPolicy;
use crate::domain::snapshot::StockSnapshot;
use crate::infrastructure::browser::DriverError;
use crate::infrastructure::config::{marketplace, AppConfig};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::interceptor::decode_widget_states;
use crate::infrastructure::parsing::{SchemaFieldResolver, StockObservation};

use super::store::StockSnapshotStore;

/// Where one product's stock/review observation comes from
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn observe(
        &self,
        product_id: &str,
        token: &CancellationToken,
    ) -> Result<StockObservation, DriverError>;
}

/// Default source: the page-composition API over plain HTTP
pub struct ComposerObservationSource {
    http: HttpClient,
    resolver: SchemaFieldResolver,
    base_url: String,
}

impl ComposerObservationSource {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            resolver: SchemaFieldResolver::new(),
            base_url: base_url.into(),
        }
    }

    fn observation_url(&self, product_id: &str) -> Result<String, DriverError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| DriverError::Navigation {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        url.set_path(marketplace::ENTRYPOINT_API_PATH);
        url.query_pairs_mut()
            .append_pair("url", &format!("/product/{product_id}/"));
        Ok(url.into())
    }
}

#[async_trait]
impl ObservationSource for ComposerObservationSource {
    async fn observe(
        &self,
        product_id: &str,
        token: &CancellationToken,
    ) -> Result<StockObservation, DriverError> {
        let url = self.observation_url(product_id)?;
        let body = self
            .http
            .get_text_with_cancellation(&url, token)
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let widgets = decode_widget_states(&body);
        Ok(self.resolver.resolve_stock_observation(&widgets))
    }
}

/// Outcome counts for one observation run
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Drives observation runs over a set of products
pub struct StockTracker {
    source: Arc<dyn ObservationSource>,
    store: StockSnapshotStore,
    retry: RetryPolicy,
    delay_min_ms: u64,
    delay_max_ms: u64,
}

impl StockTracker {
    pub fn new(
        source: Arc<dyn ObservationSource>,
        store: StockSnapshotStore,
        config: &AppConfig,
    ) -> Self {
        Self {
            source,
            store,
            retry: RetryPolicy::new(config.advanced.max_retries, config.advanced.retry_delay_ms),
            delay_min_ms: config.user.request_delay_min_ms,
            delay_max_ms: config.user.request_delay_max_ms,
        }
    }

    /// Observe each product once, appending and streaming its snapshot.
    /// Writes per product are serialized by running them sequentially with
    /// fresh timestamps, so delta computation never sees a stale ordering.
    pub async fn track(
        &self,
        product_ids: &[String],
        snapshot_tx: mpsc::Sender<StockSnapshot>,
        token: &CancellationToken,
    ) -> TrackReport {
        let mut report = TrackReport {
            total: product_ids.len(),
            ..TrackReport::default()
        };

        for (index, product_id) in product_ids.iter().enumerate() {
            if token.is_cancelled() {
                info!("observation run cancelled after {} products", index);
                break;
            }

            let source = Arc::clone(&self.source);
            let id = product_id.clone();
            let op_token = token.clone();
            let observed = self
                .retry
                .run(token, move || {
                    let source = Arc::clone(&source);
                    let id = id.clone();
                    let token = op_token.clone();
                    async move { source.observe(&id, &token).await }
                })
                .await;

            match observed {
                Ok(observation) => {
                    let snapshot = StockSnapshot::new(
                        product_id.clone(),
                        Utc::now(),
                        observation.stock_quantity,
                        observation.review_count,
                    );
                    self.store.append(snapshot.clone()).await;
                    report.succeeded += 1;
                    if snapshot_tx.send(snapshot).await.is_err() {
                        info!("snapshot receiver dropped; continuing to record");
                    }
                }
                Err(error) => {
                    warn!("observation failed for {}: {}", product_id, error);
                    report.failed += 1;
                }
            }

            if index + 1 < product_ids.len() {
                let span = self.delay_max_ms.max(self.delay_min_ms);
                let delay = if span > self.delay_min_ms {
                    fastrand::u64(self.delay_min_ms..=span)
                } else {
                    self.delay_min_ms
                };
                tokio::select! {
                    () = tokio::time::sleep(std::time::Duration::from_millis(delay)) => {},
                    () = token.cancelled() => break,
                }
            }
        }

        info!(
            "observation run finished: {}/{} succeeded, {} failed",
            report.succeeded, report.total, report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ObservationSource for ScriptedSource {
        async fn observe(
            &self,
            product_id: &str,
            _token: &CancellationToken,
        ) -> Result<StockObservation, DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if product_id == "bad" {
                return Err(DriverError::Interstitial);
            }
            Ok(StockObservation {
                stock_quantity: Some(42),
                review_count: Some(100),
            })
        }
    }

    #[tokio::test]
    async fn run_appends_snapshots_and_counts_failures() {
        let store = StockSnapshotStore::new();
        let tracker = StockTracker {
            source: Arc::new(ScriptedSource {
                calls: AtomicU32::new(0),
            }),
            store: store.clone(),
            retry: RetryPolicy::new(1, 1),
            delay_min_ms: 0,
            delay_max_ms: 0,
        };

        let (tx, mut rx) = mpsc::channel(16);
        let ids = vec!["p1".to_string(), "bad".to_string(), "p2".to_string()];
        let report = tracker.track(&ids, tx, &CancellationToken::new()).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.series("p1").await.len(), 1);
        assert!(store.series("bad").await.is_empty());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stock_remaining, Some(42));
    }

    #[test]
    fn observation_url_embeds_product_path() {
        let source = ComposerObservationSource::new(
            HttpClient::new(crate::infrastructure::config::NetworkConfig::default()).unwrap(),
            marketplace::BASE_URL,
        );
        let url = source.observation_url("1681720585").unwrap();
        assert!(url.contains("/api/entrypoint-api.bx/page/json/v2"));
        assert!(url.contains("product%2F1681720585"));
    }
}
