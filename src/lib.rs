//! Ozon Pulse - Marketplace Product Collection & Sales Estimation Engine
//!
//! This library collects structured product listings from a marketplace whose
//! rich data is only exposed through an internal page-composition API and
//! rendered page text, and turns repeated stock/review observations into
//! confidence-scored sales estimates.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod crawl_engine;
pub mod tracking;

// Re-export the facade and the most commonly used record types
pub use application::OzonPulse;
pub use domain::product::{PartialProduct, ProductRecord, SourceFidelity};
pub use domain::snapshot::StockSnapshot;
pub use domain::estimate::SalesEstimate;
