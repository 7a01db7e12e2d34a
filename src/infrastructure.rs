//! Infrastructure layer for configuration, transport, and extraction
//!
//! This module provides the browser session seam, network response
//! interception, widget/DOM parsing, the rate-limited HTTP client used by
//! the observation job, and configuration and logging setup.

pub mod browser; // Browser session seam (PageDriver)
pub mod config; // Configuration tiers and persistence
pub mod http_client; // Rate-limited client for the observation job
pub mod interceptor; // Network response interception and envelope decode
pub mod logging; // Logging infrastructure
pub mod parsing; // Field resolution, unit normalization, DOM fallback

// Re-export commonly used items
pub use browser::{DriverError, NetworkResponse, PageDriver, ScrollOutcome};
pub use config::{AppConfig, ConfigManager, EstimationConfig, NetworkConfig};
pub use http_client::HttpClient;
pub use interceptor::{InterceptConfig, ResponseInterceptor, WidgetEnvelope};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use parsing::{
    DomFallbackParser, ParseError, ParseResult, ResolverConfig, SchemaFieldResolver, WidgetMap,
};
