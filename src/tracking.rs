//! Stock tracking and sales estimation
//!
//! The append-only snapshot store, the periodic observation job that feeds
//! it, the estimation cascade that reads it, and the activity scorer over
//! front-end observable signals.

pub mod activity;
pub mod estimator;
pub mod store;
pub mod tracker;

// Re-export commonly used items
pub use activity::{score_activity, ActivityScore, ActivitySignals, ActivityVerdict};
pub use estimator::{ProductFacts, SalesEstimator};
pub use store::StockSnapshotStore;
pub use tracker::{ComposerObservationSource, ObservationSource, StockTracker, TrackReport};
