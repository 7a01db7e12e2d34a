//! Sales activity scoring from front-end observable signals
//!
//! Combines weighted signals into a 0-100 activity score answering "did
//! this listing sell within the last week". Fresh reviews and an observed
//! stock drop are near-definitive; search rank, next-day delivery and promo
//! badges are supporting evidence only.

use serde::{Deserialize, Serialize};

const WEIGHT_REVIEW_TIMESTAMP: u32 = 40;
const WEIGHT_STOCK_CHANGE: u32 = 30;
const WEIGHT_SEARCH_RANK: u32 = 15;
const WEIGHT_DELIVERY_SPEED: u32 = 10;
const WEIGHT_PROMOTION_BADGE: u32 = 5;

/// Observable inputs for one product
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivitySignals {
    /// New reviews within the last 7 days
    pub reviews_in_7d: u32,
    /// Stock decreased between observations
    pub stock_decreased: bool,
    /// Position in search results, when the product was seen there
    pub search_rank: Option<u32>,
    /// Next-day (fulfilled-from-warehouse) delivery offered
    pub delivery_tomorrow: bool,
    /// Promo/advertising badge present
    pub has_promotion: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityVerdict {
    /// Sales in the period are certain
    Active,
    /// Sales are probable
    LikelyActive,
    /// Cannot tell either way
    Uncertain,
    /// Probably no sales in the period
    LikelyInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityScore {
    pub score: u32,
    pub verdict: ActivityVerdict,
}

/// Score one product's activity signals.
pub fn score_activity(signals: ActivitySignals) -> ActivityScore {
    let mut score = 0;

    if signals.reviews_in_7d > 0 {
        score += WEIGHT_REVIEW_TIMESTAMP.min(signals.reviews_in_7d * 4);
    }
    if signals.stock_decreased {
        score += WEIGHT_STOCK_CHANGE;
    }
    if let Some(rank) = signals.search_rank {
        score += match rank {
            0..=12 => WEIGHT_SEARCH_RANK,
            13..=24 => 10,
            25..=36 => 5,
            _ => 0,
        };
    }
    if signals.delivery_tomorrow {
        score += WEIGHT_DELIVERY_SPEED;
    }
    if signals.has_promotion {
        score += WEIGHT_PROMOTION_BADGE;
    }

    let verdict = match score {
        40.. => ActivityVerdict::Active,
        20..=39 => ActivityVerdict::LikelyActive,
        10..=19 => ActivityVerdict::Uncertain,
        _ => ActivityVerdict::LikelyInactive,
    };
    ActivityScore { score, verdict }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_reviews_alone_reach_active() {
        let result = score_activity(ActivitySignals {
            reviews_in_7d: 10,
            ..ActivitySignals::default()
        });
        assert_eq!(result.score, 40);
        assert_eq!(result.verdict, ActivityVerdict::Active);
    }

    #[test]
    fn review_signal_is_capped() {
        let result = score_activity(ActivitySignals {
            reviews_in_7d: 100,
            ..ActivitySignals::default()
        });
        assert_eq!(result.score, 40);
    }

    #[test]
    fn supporting_signals_only_reach_likely() {
        let result = score_activity(ActivitySignals {
            search_rank: Some(5),
            delivery_tomorrow: true,
            has_promotion: true,
            ..ActivitySignals::default()
        });
        assert_eq!(result.score, 30);
        assert_eq!(result.verdict, ActivityVerdict::LikelyActive);
    }

    #[test]
    fn verdict_band_boundaries() {
        let with_rank = |rank| {
            score_activity(ActivitySignals {
                search_rank: Some(rank),
                ..ActivitySignals::default()
            })
        };
        assert_eq!(with_rank(12).verdict, ActivityVerdict::Uncertain);
        assert_eq!(with_rank(30).verdict, ActivityVerdict::LikelyInactive);
        assert_eq!(with_rank(999).score, 0);
    }
}
