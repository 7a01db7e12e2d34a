//! Pagination coordinator: the per-task collection state machine
//!
//! One coordinator drives one browser session through a keyword task:
//! repeated extraction passes over the visible listing (intercepted widgets
//! first, rendered-DOM fallback as a complement), scroll/load-more stepping
//! with a stall bound, SKU-keyed deduplication, and - for deep collection -
//! the two-step detail phase per item. Records stream out as soon as an
//! item completes; cancellation flushes everything already merged instead
//! of discarding in-flight work.

use std::collections::{HashMap, HashSet};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::product::{PartialProduct, ProductDraft, ProductRecord};
use crate::domain::task::{CollectionStatus, CollectionSummary};
use crate::infrastructure::browser::{search_url, DriverError, NetworkResponse, PageDriver, ScrollOutcome};
use crate::infrastructure::config::marketplace;
use crate::infrastructure::interceptor::ResponseInterceptor;
use crate::infrastructure::parsing::{DomFallbackParser, ParseError, SchemaFieldResolver};

use super::context::CollectionContext;
use super::events::TaskEvent;
use super::retry::RetryPolicy;

/// Collection-task failures beyond a single item
#[derive(Error, Debug)]
pub enum CollectError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("anti-bot challenge encountered; aborting task")]
    AntiBot,

    #[error("{failures} consecutive detail failures; aborting task")]
    RepeatedFailures { failures: u32 },

    #[error("task cancelled")]
    Cancelled,
}

/// What one task is asked to collect
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub keyword: String,
    pub max_items: u32,
    pub deep_collect: bool,
}

/// Retry wrapper for driver calls. A macro rather than a helper because the
/// wrapped futures borrow the driver mutably.
macro_rules! driver_retry {
    ($self:ident, $op:expr) => {{
        let policy = $self.retry;
        let token = $self.context.cancellation_token().clone();
        let mut attempt = 0u32;
        loop {
            if token.is_cancelled() {
                break Err(DriverError::SessionClosed);
            }
            attempt += 1;
            match $op {
                Ok(value) => break Ok(value),
                Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.backoff_delay(attempt);
                    warn!(
                        "transient driver failure (attempt {}/{}), retrying in {:?}: {}",
                        attempt, policy.max_attempts, delay, error
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {},
                        () = token.cancelled() => break Err(DriverError::SessionClosed),
                    }
                }
                Err(error) => break Err(error),
            }
        }
    }};
}

/// Drives one collection task across list and detail phases
pub struct PaginationCoordinator<D: PageDriver> {
    driver: D,
    context: CollectionContext,
    interceptor: ResponseInterceptor,
    resolver: SchemaFieldResolver,
    dom_parser: DomFallbackParser,
    responses: mpsc::Receiver<NetworkResponse>,
    retry: RetryPolicy,

    // Task-scoped result state, never shared across tasks
    drafts: HashMap<String, ProductDraft>,
    order: Vec<String>,
    emitted: HashSet<String>,
    discarded: usize,
    degraded: usize,
}

impl<D: PageDriver> PaginationCoordinator<D> {
    /// Wire a coordinator to a fresh driver session. Fails when the driver
    /// cannot hand over its response channel (already consumed).
    pub fn new(mut driver: D, context: CollectionContext) -> Result<Self, CollectError> {
        let responses = driver
            .take_responses()
            .ok_or(DriverError::SessionClosed)?;
        let advanced = &context.config.advanced;
        let retry = RetryPolicy::new(advanced.max_retries, advanced.retry_delay_ms);
        let dom_parser = DomFallbackParser::new()?;
        Ok(Self {
            driver,
            context,
            interceptor: ResponseInterceptor::new(),
            resolver: SchemaFieldResolver::new(),
            dom_parser,
            responses,
            retry,
            drafts: HashMap::new(),
            order: Vec::new(),
            emitted: HashSet::new(),
            discarded: 0,
            degraded: 0,
        })
    }

    /// Reset per-task state; one coordinator session can run several
    /// keyword tasks back to back.
    fn reset_for_task(&mut self) {
        self.context = self.context.with_task();
        self.drafts.clear();
        self.order.clear();
        self.emitted.clear();
        self.discarded = 0;
        self.degraded = 0;
    }

    /// Run one task to its terminal status, streaming completed records.
    /// The driver session stays open for a follow-up task; call
    /// [`Self::shutdown`] when done.
    pub async fn run(
        &mut self,
        spec: TaskSpec,
        record_tx: mpsc::Sender<ProductRecord>,
    ) -> CollectionSummary {
        self.reset_for_task();
        let started_at = Utc::now();
        self.context.emit(TaskEvent::TaskStarted {
            task_id: self.context.task_id.clone(),
            keyword: spec.keyword.clone(),
            target: spec.max_items,
        });

        let mut status = match self.list_phase(&spec).await {
            Ok(status) => status,
            Err(CollectError::Cancelled) => CollectionStatus::Aborted,
            Err(error) => {
                warn!("[{}] list phase aborted: {}", spec.keyword, error);
                CollectionStatus::Aborted
            }
        };

        if spec.deep_collect
            && status != CollectionStatus::Aborted
            && !self.context.is_cancelled()
        {
            if let Err(error) = self.detail_phase(&spec, &record_tx).await {
                if !matches!(error, CollectError::Cancelled) {
                    warn!("[{}] detail phase aborted: {}", spec.keyword, error);
                }
                status = CollectionStatus::Aborted;
            }
        }
        if self.context.is_cancelled() {
            status = CollectionStatus::Aborted;
        }

        // Flush everything merged so far - cancellation must not lose
        // items that already completed.
        self.flush_pending(&spec, &record_tx).await;

        let merged = self.emitted.len().saturating_sub(self.degraded);
        let summary = CollectionSummary {
            task_id: self.context.task_id.clone(),
            keyword: spec.keyword.clone(),
            status,
            merged,
            degraded: self.degraded,
            discarded: self.discarded,
            started_at,
            finished_at: Utc::now(),
        };
        self.context.emit(TaskEvent::TaskFinished {
            task_id: summary.task_id.clone(),
            status,
            merged,
            degraded: summary.degraded,
            discarded: summary.discarded,
        });
        info!(
            "[{}] task finished: {:?}, {} merged / {} degraded / {} discarded",
            spec.keyword, status, merged, summary.degraded, summary.discarded
        );
        summary
    }

    /// Close the browser session.
    pub async fn shutdown(mut self) {
        if let Err(error) = self.driver.close().await {
            debug!("driver close failed: {}", error);
        }
    }

    /// List collection: extraction pass, scroll, repeat until the target is
    /// reached, the listing is exhausted, or the stall bound trips.
    async fn list_phase(&mut self, spec: &TaskSpec) -> Result<CollectionStatus, CollectError> {
        let user = &self.context.config.user;
        let url = search_url(&user.base_url, &spec.keyword, user.import_only)?;
        let (delay_min, delay_max) = (user.request_delay_min_ms, user.request_delay_max_ms);
        let (settle_min, settle_max) = (
            self.context.config.advanced.scroll_settle_min_ms,
            self.context.config.advanced.scroll_settle_max_ms,
        );
        let stall_limit = self.context.config.advanced.stall_pass_limit;

        self.interceptor.begin_navigation();
        driver_retry!(self, self.driver.navigate(&url).await)?;

        let mut stalled_passes = 0u32;
        loop {
            if self.context.is_cancelled() {
                return Err(CollectError::Cancelled);
            }

            let new_items = self.extraction_pass(spec).await?;
            if new_items > 0 {
                stalled_passes = 0;
                self.context.emit(TaskEvent::Progress {
                    task_id: self.context.task_id.clone(),
                    collected: self.order.len(),
                    target: spec.max_items,
                });
                info!(
                    "[{}] collected {}/{} items",
                    spec.keyword,
                    self.order.len(),
                    spec.max_items
                );
            } else {
                stalled_passes += 1;
                if stalled_passes >= stall_limit {
                    info!(
                        "[{}] {} passes without new items, listing exhausted",
                        spec.keyword, stall_limit
                    );
                    return Ok(CollectionStatus::Exhausted);
                }
            }

            if self.order.len() >= spec.max_items as usize {
                return Ok(CollectionStatus::Completed);
            }

            match driver_retry!(self, self.driver.scroll_step().await)? {
                ScrollOutcome::Exhausted => {
                    info!("[{}] listing bottom reached", spec.keyword);
                    return Ok(CollectionStatus::Exhausted);
                }
                ScrollOutcome::Grew | ScrollOutcome::LoadMoreClicked => {}
            }
            if !self.context.paced_sleep(settle_min, settle_max).await {
                return Err(CollectError::Cancelled);
            }
            if !self.context.paced_sleep(delay_min, delay_max).await {
                return Err(CollectError::Cancelled);
            }
        }
    }

    /// One extraction pass over the currently-visible listing: intercepted
    /// widgets first, DOM cards as the complement. Returns newly-seen SKUs.
    async fn extraction_pass(&mut self, spec: &TaskSpec) -> Result<usize, CollectError> {
        let base_url = self.context.config.user.base_url.clone();
        let mut new_items = 0;

        let envelopes = self.interceptor.drain(&mut self.responses);
        for envelope in envelopes {
            let resolution = self.resolver.resolve_list_items(&envelope.widgets, &base_url);
            self.discarded += resolution.discarded;
            for item in resolution.items {
                new_items += self.absorb(item, spec.max_items);
            }
        }

        let html = driver_retry!(self, self.driver.visible_html().await)?;
        match self.dom_parser.parse_cards(&html, &base_url) {
            Ok(extraction) => {
                self.discarded += extraction.discarded;
                for card in extraction.cards {
                    new_items += self.absorb(card, spec.max_items);
                }
            }
            Err(ParseError::InterstitialDetected) => return Err(CollectError::AntiBot),
            Err(error) => debug!("DOM fallback pass failed: {}", error),
        }

        Ok(new_items)
    }

    /// Merge one extraction pass into the task's draft set. Returns 1 when
    /// the SKU is new to this task. A partial without identity is counted
    /// as discarded, never silently dropped.
    fn absorb(&mut self, partial: PartialProduct, max_items: u32) -> usize {
        if !partial.has_identity() {
            self.discarded += 1;
            return 0;
        }
        let sku = partial.sku.clone();
        if let Some(draft) = self.drafts.get_mut(&sku) {
            draft.absorb(partial);
            return 0;
        }
        if self.order.len() >= max_items as usize {
            return 0;
        }
        let mut draft = ProductDraft::new(sku.clone());
        draft.absorb(partial);
        self.drafts.insert(sku.clone(), draft);
        self.order.push(sku);
        1
    }

    /// Per-item detail phases. A single failure degrades the item; repeated
    /// consecutive failures or an interstitial abort the task.
    async fn detail_phase(
        &mut self,
        spec: &TaskSpec,
        record_tx: &mpsc::Sender<ProductRecord>,
    ) -> Result<(), CollectError> {
        let failure_limit = self.context.config.advanced.detail_failure_limit;
        let (delay_min, delay_max) = (
            self.context.config.user.request_delay_min_ms,
            self.context.config.user.request_delay_max_ms,
        );
        self.context.emit(TaskEvent::DetailPhaseStarted {
            task_id: self.context.task_id.clone(),
            items: self.order.len(),
        });

        let mut consecutive_failures = 0u32;
        let skus: Vec<String> = self.order.clone();
        for sku in skus {
            if self.context.is_cancelled() {
                return Err(CollectError::Cancelled);
            }

            match self.collect_detail(&sku).await {
                Ok(()) => consecutive_failures = 0,
                Err(CollectError::AntiBot) => return Err(CollectError::AntiBot),
                Err(CollectError::Driver(DriverError::Interstitial)) => {
                    return Err(CollectError::AntiBot)
                }
                Err(CollectError::Cancelled) => return Err(CollectError::Cancelled),
                Err(error) => {
                    warn!("[{}] detail phase failed for {}: {}", spec.keyword, sku, error);
                    if let Some(draft) = self.drafts.get_mut(&sku) {
                        draft.degraded = true;
                    }
                    self.degraded += 1;
                    self.context.emit(TaskEvent::ItemDegraded {
                        task_id: self.context.task_id.clone(),
                        sku: sku.clone(),
                        reason: error.to_string(),
                    });
                    consecutive_failures += 1;
                    if consecutive_failures >= failure_limit {
                        return Err(CollectError::RepeatedFailures {
                            failures: consecutive_failures,
                        });
                    }
                }
            }

            self.emit_record(&sku, spec, record_tx).await;

            if !self.context.paced_sleep(delay_min, delay_max).await {
                return Err(CollectError::Cancelled);
            }
        }
        Ok(())
    }

    /// Two-step deep extraction for one item: the detail page load, then
    /// the scroll-triggered second data phase. Both phases merge through
    /// the same fidelity rules, so arrival order never matters.
    async fn collect_detail(&mut self, sku: &str) -> Result<(), CollectError> {
        let url = self
            .drafts
            .get(sku)
            .map(|draft| draft.resolved("", Utc::now()).product_url)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("{}{}/", marketplace::PRODUCT_URL_PREFIX, sku));

        // Stale buffered responses belong to earlier navigations
        let _ = self.interceptor.drain(&mut self.responses);
        self.interceptor.begin_navigation();

        let phase1_html = driver_retry!(self, self.driver.open_detail(&url).await)?;
        self.absorb_detail_pass(sku, &url, &phase1_html)?;

        let phase2_html = driver_retry!(self, self.driver.expand_detail().await)?;
        self.absorb_detail_pass(sku, &url, &phase2_html)?;

        Ok(())
    }

    fn absorb_detail_pass(
        &mut self,
        sku: &str,
        url: &str,
        html: &str,
    ) -> Result<(), CollectError> {
        for envelope in self.interceptor.drain(&mut self.responses) {
            let mut partial = self.resolver.resolve_detail(&envelope.widgets, url);
            if partial.sku.is_empty() {
                partial.sku = sku.to_string();
            }
            if let Some(draft) = self.drafts.get_mut(sku) {
                draft.absorb(partial);
            }
        }

        match self.dom_parser.parse_detail(html, url) {
            Ok(partial) => {
                if let Some(draft) = self.drafts.get_mut(sku) {
                    draft.absorb(partial);
                }
            }
            Err(ParseError::InterstitialDetected) => return Err(CollectError::AntiBot),
            Err(error) => debug!("detail DOM fallback skipped for {}: {}", sku, error),
        }
        Ok(())
    }

    /// Resolve and stream one completed item exactly once.
    async fn emit_record(
        &mut self,
        sku: &str,
        spec: &TaskSpec,
        record_tx: &mpsc::Sender<ProductRecord>,
    ) {
        if self.emitted.contains(sku) {
            return;
        }
        let Some(draft) = self.drafts.get(sku) else {
            return;
        };
        let record = draft.resolved(&spec.keyword, Utc::now());
        self.emitted.insert(sku.to_string());
        if record_tx.send(record).await.is_err() {
            debug!("record receiver dropped; continuing for the summary");
        }
    }

    /// Emit every merged-but-unemitted item (shallow tasks emit everything
    /// here; cancelled tasks flush their completed work).
    async fn flush_pending(&mut self, spec: &TaskSpec, record_tx: &mpsc::Sender<ProductRecord>) {
        let skus: Vec<String> = self.order.clone();
        for sku in skus {
            self.emit_record(&sku, spec, record_tx).await;
        }
    }
}
