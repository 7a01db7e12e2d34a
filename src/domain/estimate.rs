//! Sales estimate output types
//!
//! An estimate is a pure function of a product's snapshot series plus its
//! listing age and price; it is computed on read and cached, never stored as
//! ground truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which tier of the estimation cascade produced a figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    /// No usable data this window
    None,
    /// Accumulated stock decreases between consecutive snapshots
    StockDiff,
    /// Review-count growth divided by the assumed conversion rate
    ReviewGrowth,
    /// Total review count extrapolated over the listing age
    ReviewTotalEstimate,
}

impl Default for EstimationMethod {
    fn default() -> Self {
        Self::None
    }
}

/// Qualitative reliability of an estimate, driven by usable data points
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Default for Confidence {
    fn default() -> Self {
        Self::None
    }
}

/// Estimate for a single time window (weekly or monthly)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowEstimate {
    /// Estimated units sold within the window
    pub units: u64,
    pub method: EstimationMethod,
    pub confidence: Confidence,
    /// In-window snapshot count the confidence was derived from
    #[serde(rename = "dataPoints")]
    pub data_points: usize,
    #[serde(rename = "periodDays")]
    pub period_days: u32,
    /// A stock increase was observed and excluded from the delta sum
    #[serde(rename = "restockDetected")]
    pub restock_detected: bool,
}

impl WindowEstimate {
    pub fn empty(period_days: u32) -> Self {
        Self {
            units: 0,
            method: EstimationMethod::None,
            confidence: Confidence::None,
            data_points: 0,
            period_days,
            restock_detected: false,
        }
    }
}

/// Combined weekly/monthly estimate for one product.
///
/// The flattened `method`/`confidence` mirror the monthly window, which is
/// what gets persisted onto the product record downstream; the per-window
/// values stay available for callers that need them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesEstimate {
    #[serde(rename = "productId")]
    pub product_id: String,
    #[serde(rename = "weeklySales")]
    pub weekly_sales: u64,
    #[serde(rename = "monthlySales")]
    pub monthly_sales: u64,
    pub weekly: WindowEstimate,
    pub monthly: WindowEstimate,
    pub method: EstimationMethod,
    pub confidence: Confidence,
    /// `price x monthlySales` when the current price is known
    #[serde(rename = "monthlyGmv")]
    pub monthly_gmv: Option<f64>,
    #[serde(rename = "estimatedAt")]
    pub estimated_at: DateTime<Utc>,
}

impl SalesEstimate {
    /// The "no data at all" estimate: zero sales, `confidence = none`.
    /// Insufficient data is not an error condition.
    pub fn empty(product_id: impl Into<String>, estimated_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product_id.into(),
            weekly_sales: 0,
            monthly_sales: 0,
            weekly: WindowEstimate::empty(7),
            monthly: WindowEstimate::empty(30),
            method: EstimationMethod::None,
            confidence: Confidence::None,
            monthly_gmv: None,
            estimated_at,
        }
    }
}
