//! Logging system configuration and initialization
//!
//! This module provides the tracing setup with:
//! - Console output with configuration-file based log level control
//! - Optional daily-rolling file output
//! - Environment variable override via RUST_LOG
//! - MSK (Moscow Time, UTC+3) timestamps - the marketplace's home zone,
//!   which keeps log times aligned with observed listing activity

use anyhow::{anyhow, Result};
use chrono::{FixedOffset, Utc};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

// Re-export LoggingConfig from config module
pub use crate::infrastructure::config::LoggingConfig;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Custom time formatter for MSK (Moscow Time, UTC+3)
struct MskTimeFormatter;

impl FormatTime for MskTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now();
        let msk_offset = FixedOffset::east_opt(3 * 3600).unwrap(); // UTC+3
        let msk_time = now.with_timezone(&msk_offset);
        write!(w, "{}", msk_time.format("%Y-%m-%d %H:%M:%S%.3f %Z"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration.
///
/// Noise from dependencies (HTTP internals, selector parsing) is suppressed
/// below their warn level unless the application level is `trace`; the
/// RUST_LOG environment variable overrides everything.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);
        if config.level != "trace" {
            for directive in ["hyper=warn", "reqwest=warn", "html5ever=warn", "selectors=warn"] {
                if let Ok(parsed) = directive.parse() {
                    filter = filter.add_directive(parsed);
                }
            }
        }
        filter
    });

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_timer(MskTimeFormatter)
            .with_target(true)
            .with_ansi(true)
    });

    let file_layer = if config.file_output {
        let log_dir = config.directory.clone().unwrap_or_else(get_log_directory);
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let appender = rolling::daily(&log_dir, "ozon-pulse.log");
        let (writer, guard) = non_blocking(appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard mutex poisoned"))?
            .push(guard);

        Some(
            fmt::layer()
                .with_timer(MskTimeFormatter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer),
        )
    } else {
        None
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!("Logging initialized (level: {})", config.level);
    Ok(())
}
