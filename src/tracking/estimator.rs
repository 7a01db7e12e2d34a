//! Sales estimation from snapshot series
//!
//! Three-tier method cascade per time window, first available wins:
//!
//! 1. **Stock delta** - accumulated stock decreases between consecutive
//!    in-window snapshots; an upward jump is a restock and that snapshot is
//!    excluded from the delta chain (neither negative sales nor sales).
//! 2. **Review growth** - review-count increase divided by the assumed
//!    review conversion rate; used when the stock method lacks snapshots.
//! 3. **Review total extrapolation** - total review count over the listing
//!    age, scaled to the window; used when neither tier above has data.
//!
//! Confidence tracks the in-window snapshot count (10/5 bands) regardless
//! of which method fired, except that tier 3 is always low and no data at
//! all is none. Weekly and monthly figures are computed independently.

use chrono::{DateTime, Duration, Utc};

use crate::domain::estimate::{Confidence, EstimationMethod, SalesEstimate, WindowEstimate};
use crate::domain::snapshot::StockSnapshot;
use crate::infrastructure::config::EstimationConfig;

/// Everything known about a product that feeds an estimate
#[derive(Debug, Clone, Default)]
pub struct ProductFacts {
    /// Listing creation date, when known
    pub created_at: Option<DateTime<Utc>>,
    /// Current price, for the GMV figure
    pub price: Option<f64>,
    /// Review total from the product record, used when no snapshot
    /// carries a review count
    pub fallback_review_count: u32,
}

/// Pure estimator over a product's snapshot series
#[derive(Debug, Clone)]
pub struct SalesEstimator {
    config: EstimationConfig,
}

impl Default for SalesEstimator {
    fn default() -> Self {
        Self::new(EstimationConfig::default())
    }
}

impl SalesEstimator {
    pub fn new(config: EstimationConfig) -> Self {
        Self { config }
    }

    /// Estimate weekly and monthly sales for one product. Pure: no side
    /// effects on the snapshot series, safely callable at any time.
    /// Insufficient data yields zero sales with `confidence = none`,
    /// never an error.
    pub fn estimate(
        &self,
        product_id: &str,
        snapshots: &[StockSnapshot],
        facts: &ProductFacts,
        now: DateTime<Utc>,
    ) -> SalesEstimate {
        let weekly = self.estimate_window(
            snapshots,
            facts,
            now,
            self.config.weekly_window_days,
        );
        let monthly = self.estimate_window(
            snapshots,
            facts,
            now,
            self.config.monthly_window_days,
        );

        let monthly_gmv = facts
            .price
            .filter(|price| *price > 0.0 && monthly.units > 0)
            .map(|price| price * monthly.units as f64);

        SalesEstimate {
            product_id: product_id.to_string(),
            weekly_sales: weekly.units,
            monthly_sales: monthly.units,
            weekly,
            monthly,
            method: monthly.method,
            confidence: monthly.confidence,
            monthly_gmv,
            estimated_at: now,
        }
    }

    /// Run the cascade for one window.
    fn estimate_window(
        &self,
        snapshots: &[StockSnapshot],
        facts: &ProductFacts,
        now: DateTime<Utc>,
        period_days: u32,
    ) -> WindowEstimate {
        let cutoff = now - Duration::days(i64::from(period_days));
        let in_window: Vec<&StockSnapshot> = snapshots
            .iter()
            .filter(|s| s.observed_at >= cutoff && s.observed_at <= now)
            .collect();
        let data_points = in_window.len();

        // Tier 1: stock delta
        if let Some((units, restock_detected)) = self.stock_delta(&in_window) {
            return WindowEstimate {
                units,
                method: EstimationMethod::StockDiff,
                confidence: self.confidence_for(data_points),
                data_points,
                period_days,
                restock_detected,
            };
        }

        // Tier 2: review growth
        if let Some(units) = self.review_growth(&in_window) {
            return WindowEstimate {
                units,
                method: EstimationMethod::ReviewGrowth,
                confidence: self.confidence_for(data_points),
                data_points,
                period_days,
                restock_detected: false,
            };
        }

        // Tier 3: review total extrapolation, always low confidence
        if let Some(units) = self.review_total(snapshots, facts, now, period_days) {
            return WindowEstimate {
                units,
                method: EstimationMethod::ReviewTotalEstimate,
                confidence: Confidence::Low,
                data_points,
                period_days,
                restock_detected: false,
            };
        }

        WindowEstimate::empty(period_days)
    }

    /// Accumulated stock decreases with restock exclusion. A snapshot that
    /// jumps above the running baseline is a restock: it neither counts as
    /// sales nor moves the baseline, so the next decrease is measured from
    /// the last pre-restock level.
    fn stock_delta(&self, in_window: &[&StockSnapshot]) -> Option<(u64, bool)> {
        let stocked: Vec<u32> = in_window
            .iter()
            .filter_map(|s| s.stock_remaining)
            .collect();
        if stocked.len() < self.config.min_stock_snapshots.max(2) {
            return None;
        }

        let mut sold: u64 = 0;
        let mut restock_detected = false;
        let mut baseline = stocked[0];
        for &current in &stocked[1..] {
            if current > baseline {
                restock_detected = true;
                continue;
            }
            sold += u64::from(baseline - current);
            baseline = current;
        }
        Some((sold, restock_detected))
    }

    /// Review-count increase across the window, scaled by the assumed
    /// conversion rate. Needs two review-bearing snapshots and actual
    /// growth.
    fn review_growth(&self, in_window: &[&StockSnapshot]) -> Option<u64> {
        let reviews: Vec<u32> = in_window.iter().filter_map(|s| s.review_count).collect();
        if reviews.len() < 2 {
            return None;
        }
        let first = *reviews.first()?;
        let last = *reviews.last()?;
        if last <= first {
            return None;
        }
        let growth = f64::from(last - first);
        Some((growth / self.config.conversion_rate).round() as u64)
    }

    /// Total-review extrapolation over the listing age.
    fn review_total(
        &self,
        snapshots: &[StockSnapshot],
        facts: &ProductFacts,
        now: DateTime<Utc>,
        period_days: u32,
    ) -> Option<u64> {
        let total_reviews = snapshots
            .iter()
            .rev()
            .find_map(|s| s.review_count)
            .unwrap_or(facts.fallback_review_count);
        if total_reviews == 0 {
            return None;
        }

        let listing_days = facts
            .created_at
            .map(|created| (now - created).num_days())
            .filter(|days| *days > 0)
            .unwrap_or(i64::from(self.config.assumed_listing_age_days));

        let total_estimated = f64::from(total_reviews) / self.config.conversion_rate;
        let daily = total_estimated / listing_days as f64;
        Some((daily * f64::from(period_days)).round() as u64)
    }

    /// Confidence bands over the in-window snapshot count
    fn confidence_for(&self, data_points: usize) -> Confidence {
        if data_points >= self.config.high_confidence_snapshots {
            Confidence::High
        } else if data_points >= self.config.medium_confidence_snapshots {
            Confidence::Medium
        } else if data_points > 0 {
            Confidence::Low
        } else {
            Confidence::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stock_series(values: &[u32], now: DateTime<Utc>) -> Vec<StockSnapshot> {
        // Evenly spaced over the last 5 days, oldest first
        let step = Duration::hours(24);
        let start = now - step * (values.len() as i32);
        values
            .iter()
            .enumerate()
            .map(|(i, &stock)| {
                StockSnapshot::new("p1", start + step * (i as i32 + 1) - Duration::hours(1), Some(stock), None)
            })
            .collect()
    }

    fn review_series(values: &[u32], now: DateTime<Utc>) -> Vec<StockSnapshot> {
        let step = Duration::hours(24);
        let start = now - step * (values.len() as i32);
        values
            .iter()
            .enumerate()
            .map(|(i, &reviews)| {
                StockSnapshot::new("p1", start + step * (i as i32 + 1) - Duration::hours(1), None, Some(reviews))
            })
            .collect()
    }

    #[test]
    fn restock_is_excluded_from_delta_sum() {
        let now = Utc::now();
        let estimator = SalesEstimator::default();
        let snapshots = stock_series(&[100, 80, 80, 95, 60], now);

        let estimate = estimator.estimate("p1", &snapshots, &ProductFacts::default(), now);
        assert_eq!(estimate.weekly.method, EstimationMethod::StockDiff);
        assert_eq!(estimate.weekly_sales, 40);
        assert!(estimate.weekly.restock_detected);
    }

    #[test]
    fn single_stock_snapshot_falls_through_to_review_growth() {
        let now = Utc::now();
        let estimator = SalesEstimator::default();
        let mut snapshots = review_series(&[500, 520], now);
        snapshots.push(StockSnapshot::new(
            "p1",
            now - Duration::hours(2),
            Some(42),
            None,
        ));
        snapshots.sort_by_key(|s| s.observed_at);

        let estimate = estimator.estimate("p1", &snapshots, &ProductFacts::default(), now);
        assert_eq!(estimate.weekly.method, EstimationMethod::ReviewGrowth);
        // 20 new reviews / 0.02 conversion rate
        assert_eq!(estimate.weekly_sales, 1000);
    }

    #[test]
    fn review_total_extrapolates_over_listing_age() {
        let now = Utc::now();
        let estimator = SalesEstimator::default();
        let facts = ProductFacts {
            created_at: Some(now - Duration::days(100)),
            fallback_review_count: 200,
            ..ProductFacts::default()
        };

        let estimate = estimator.estimate("p1", &[], &facts, now);
        assert_eq!(estimate.monthly.method, EstimationMethod::ReviewTotalEstimate);
        // 200 reviews / 0.02 = 10000 total sales over 100 days -> 3000/month
        assert_eq!(estimate.monthly_sales, 3000);
        assert_eq!(estimate.monthly.confidence, Confidence::Low);
    }

    #[test]
    fn no_data_yields_none_confidence_not_an_error() {
        let now = Utc::now();
        let estimator = SalesEstimator::default();
        let estimate = estimator.estimate("p1", &[], &ProductFacts::default(), now);
        assert_eq!(estimate.weekly_sales, 0);
        assert_eq!(estimate.monthly_sales, 0);
        assert_eq!(estimate.confidence, Confidence::None);
        assert_eq!(estimate.method, EstimationMethod::None);
    }

    #[test]
    fn confidence_band_boundaries() {
        let now = Utc::now();
        let estimator = SalesEstimator::default();
        let band = |count: usize| {
            // count snapshots inside the last week, descending stock
            let values: Vec<u32> = (0..count as u32).map(|i| 1000 - i).collect();
            let step = Duration::hours(12);
            let snapshots: Vec<StockSnapshot> = values
                .iter()
                .enumerate()
                .map(|(i, &stock)| {
                    StockSnapshot::new(
                        "p1",
                        now - step * (count as i32 - i as i32),
                        Some(stock),
                        None,
                    )
                })
                .collect();
            estimator
                .estimate("p1", &snapshots, &ProductFacts::default(), now)
                .weekly
                .confidence
        };

        assert_eq!(band(10), Confidence::High);
        assert_eq!(band(9), Confidence::Medium);
        assert_eq!(band(5), Confidence::Medium);
        assert_eq!(band(4), Confidence::Low);
    }

    #[test]
    fn gmv_follows_monthly_sales_and_price() {
        let now = Utc::now();
        let estimator = SalesEstimator::default();
        let snapshots = stock_series(&[100, 50], now);
        let facts = ProductFacts {
            price: Some(1000.0),
            ..ProductFacts::default()
        };
        let estimate = estimator.estimate("p1", &snapshots, &facts, now);
        assert_eq!(estimate.monthly_sales, 50);
        assert_eq!(estimate.monthly_gmv, Some(50_000.0));
    }

    #[test]
    fn windows_are_independent() {
        let now = Utc::now();
        let estimator = SalesEstimator::default();
        // Two stock snapshots 20 days ago (monthly window only), plus
        // review growth within the week
        let mut snapshots = vec![
            StockSnapshot::new("p1", now - Duration::days(21), Some(100), Some(500)),
            StockSnapshot::new("p1", now - Duration::days(20), Some(70), Some(505)),
        ];
        snapshots.extend(review_series(&[520, 540], now));
        snapshots.sort_by_key(|s| s.observed_at);

        let estimate = estimator.estimate("p1", &snapshots, &ProductFacts::default(), now);
        assert_eq!(estimate.monthly.method, EstimationMethod::StockDiff);
        assert_eq!(estimate.weekly.method, EstimationMethod::ReviewGrowth);
    }
}
