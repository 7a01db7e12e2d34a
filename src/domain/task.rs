//! Collection task results and keyword plans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal state of one collection task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Reached the configured item target
    Completed,
    /// The listing ran out of content before the target
    Exhausted,
    /// Stopped early: cancellation, anti-bot challenge, or repeated failures
    Aborted,
}

/// Final accounting for one collection task.
///
/// Every task reports how many items merged fully, how many were degraded to
/// list-phase data, and how many were discarded for missing identity -
/// discards are counted, never silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub keyword: String,
    pub status: CollectionStatus,
    /// Items that reached a complete merge
    pub merged: usize,
    /// Items kept with list-phase-only fields after a detail failure
    pub degraded: usize,
    /// Items dropped because no SKU could be derived
    pub discarded: usize,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt")]
    pub finished_at: DateTime<Utc>,
}

/// When to move on to the next keyword in a multi-keyword plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SwitchMode {
    /// Run each keyword to its per-keyword cap
    Sequential,
    /// Switch after collecting this many items for the current keyword
    Quantity { items: u32 },
    /// Switch after this many minutes on the current keyword
    Timer { minutes: u32 },
}

impl Default for SwitchMode {
    fn default() -> Self {
        Self::Sequential
    }
}

/// A multi-keyword collection plan driven sequentially within one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordPlan {
    pub keywords: Vec<String>,
    #[serde(rename = "maxItemsPerKeyword")]
    pub max_items_per_keyword: u32,
    /// Run the per-item detail phases after the list phase
    #[serde(rename = "deepCollect")]
    pub deep_collect: bool,
    #[serde(default)]
    pub switch: SwitchMode,
}

/// Outcome of a batch ingestion from an alternate collector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchIngestReport {
    /// Payloads merged into new or existing records
    pub merged: usize,
    /// Payloads rejected for missing identity
    pub discarded: usize,
}
