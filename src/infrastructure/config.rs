//! Configuration infrastructure
//!
//! Contains configuration loading and management for marketplace collection.
//!
//! Configuration is organized into two tiers:
//! 1. User-configurable settings (what/how much to collect)
//! 2. Hidden/Advanced settings (pacing, thresholds, estimation constants)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// Marketplace endpoints the collector talks to
pub mod marketplace {
    pub const BASE_URL: &str = "https://www.ozon.ru";
    pub const PRODUCT_URL_PREFIX: &str = "https://www.ozon.ru/product/";
    pub const COMPOSER_API_PATH: &str = "/api/composer-api.bx/page/json/v2";
    pub const ENTRYPOINT_API_PATH: &str = "/api/entrypoint-api.bx/page/json/v2";
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// User-configurable settings
    pub user: UserConfig,

    /// Hidden/Advanced settings (config file only)
    pub advanced: AdvancedConfig,
}

/// User-configurable collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Marketplace base URL
    pub base_url: String,

    /// Maximum items to collect per keyword in a single task
    pub max_items_per_keyword: u32,

    /// Run per-item detail phases after list collection
    pub deep_collect: bool,

    /// Restrict searches to cross-border listings
    pub import_only: bool,

    /// Minimum pacing delay between extraction passes, in milliseconds
    pub request_delay_min_ms: u64,

    /// Maximum pacing delay between extraction passes, in milliseconds
    pub request_delay_max_ms: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            base_url: marketplace::BASE_URL.to_string(),
            max_items_per_keyword: 5000,
            deep_collect: false,
            import_only: false,
            request_delay_min_ms: 1000,
            request_delay_max_ms: 2500,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable console output
    pub console_output: bool,

    /// Enable daily-rolling file output
    pub file_output: bool,

    /// Log directory; defaults next to the executable when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            directory: None,
        }
    }
}

/// Hidden/Advanced settings that live in the config file but are not
/// exposed in any UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Consecutive no-new-item passes before a listing counts as exhausted
    pub stall_pass_limit: u32,

    /// Consecutive detail-phase failures before the whole task aborts
    pub detail_failure_limit: u32,

    /// Retry attempts for transient navigation failures
    pub max_retries: u32,

    /// Base backoff delay in milliseconds (doubles per attempt)
    pub retry_delay_ms: u64,

    /// Settle delay range after a scroll step, in milliseconds
    pub scroll_settle_min_ms: u64,
    pub scroll_settle_max_ms: u64,

    /// Cool-down range between keywords of a plan, in milliseconds
    pub keyword_switch_min_ms: u64,
    pub keyword_switch_max_ms: u64,

    /// Bound for the network-response channel
    pub response_buffer_size: usize,

    /// Sales estimation constants
    pub estimation: EstimationConfig,

    /// Plain-HTTP client settings for the observation job
    pub network: NetworkConfig,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            stall_pass_limit: 10,
            detail_failure_limit: 5,
            max_retries: 3,
            retry_delay_ms: 500,
            scroll_settle_min_ms: 1500,
            scroll_settle_max_ms: 3000,
            keyword_switch_min_ms: 5000,
            keyword_switch_max_ms: 15000,
            response_buffer_size: 64,
            estimation: EstimationConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// Sales estimation constants.
///
/// The conversion rate is an assumed review-to-sale ratio inherited from
/// observation, not a verified constant; the snapshot thresholds are the
/// confidence bands pending calibration against ground truth. All of them
/// are deliberately configuration, not law.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Assumed share of buyers who leave a review
    pub conversion_rate: f64,

    /// Minimum in-window snapshots for the stock-delta method
    pub min_stock_snapshots: usize,

    /// In-window snapshot count for high confidence
    pub high_confidence_snapshots: usize,

    /// In-window snapshot count for medium confidence
    pub medium_confidence_snapshots: usize,

    pub weekly_window_days: u32,
    pub monthly_window_days: u32,

    /// Assumed listing age when the creation date is unknown, in days
    pub assumed_listing_age_days: u32,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            conversion_rate: 0.02,
            min_stock_snapshots: 2,
            high_confidence_snapshots: 10,
            medium_confidence_snapshots: 5,
            weekly_window_days: 7,
            monthly_window_days: 30,
            assumed_listing_age_days: 180,
        }
    }
}

/// Plain-HTTP client settings for the stock observation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// User-agent pool; one is picked at random per session
    pub user_agents: Vec<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Rate limit for observation requests
    pub max_requests_per_second: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            ],
            timeout_seconds: 30,
            max_requests_per_second: 2,
        }
    }
}

impl NetworkConfig {
    /// Pick a user agent from the pool at random
    pub fn random_user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return "ozon-pulse/0.3";
        }
        let index = fastrand::usize(..self.user_agents.len());
        &self.user_agents[index]
    }
}

/// Loads and persists the application configuration as JSON
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager over the platform-default config location
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not determine platform config directory")?
            .join("ozon-pulse");
        Ok(Self {
            config_path: config_dir.join("config.json"),
        })
    }

    /// Manager over an explicit config file path
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load the configuration, creating the default file on first run
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("No config file found, creating default at {:?}", self.config_path);
            let config = AppConfig::default();
            self.save_config(&config).await?;
            return Ok(config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", self.config_path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", self.config_path))?;
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
        }
        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write config file: {:?}", self.config_path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        let mut config = manager.load_config().await.unwrap();
        assert_eq!(config.advanced.stall_pass_limit, 10);

        config.user.max_items_per_keyword = 250;
        manager.save_config(&config).await.unwrap();

        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.user.max_items_per_keyword, 250);
    }

    #[test]
    fn estimation_defaults_match_confidence_bands() {
        let estimation = EstimationConfig::default();
        assert_eq!(estimation.high_confidence_snapshots, 10);
        assert_eq!(estimation.medium_confidence_snapshots, 5);
        assert!(estimation.conversion_rate > 0.0);
    }
}
