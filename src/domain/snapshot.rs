//! Stock observation snapshots
//!
//! A snapshot is one timestamped observation of a product's remaining stock
//! and/or review count. Snapshots are append-only: a correction is a new
//! snapshot, never an edit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quantity above which a listing is no longer considered "low stock"
pub const LOW_STOCK_MAX: u32 = 10;

/// Coarse availability classification derived from an observed quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Unknown,
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(quantity: u32) -> Self {
        match quantity {
            0 => Self::OutOfStock,
            q if q <= LOW_STOCK_MAX => Self::LowStock,
            _ => Self::InStock,
        }
    }
}

impl Default for StockStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// One immutable stock/review observation for a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    #[serde(rename = "productId")]
    pub product_id: String,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
    /// Remaining units, when the page exposed a number this pass
    #[serde(rename = "stockRemaining")]
    pub stock_remaining: Option<u32>,
    /// Total review count, when observed this pass
    #[serde(rename = "reviewCount")]
    pub review_count: Option<u32>,
}

impl StockSnapshot {
    pub fn new(
        product_id: impl Into<String>,
        observed_at: DateTime<Utc>,
        stock_remaining: Option<u32>,
        review_count: Option<u32>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            observed_at,
            stock_remaining,
            review_count,
        }
    }

    pub fn status(&self) -> StockStatus {
        match self.stock_remaining {
            Some(qty) => StockStatus::classify(qty),
            None => StockStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries() {
        assert_eq!(StockStatus::classify(0), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(1), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(10), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(11), StockStatus::InStock);
    }
}
