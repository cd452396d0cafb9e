//! Tracing bootstrap for processes embedding the provisioner.
//!
//! Scheduling decisions are recorded under the `events` target at debug
//! level; during a large scale-up they would flood the log, so debug events
//! from that target are dropped regardless of the filter.

use serde::Deserialize;
use tracing::{Level, Metadata};
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::error::TelemetryError;

/// Target used for scheduling decision events.
pub const EVENTS_TARGET: &str = "events";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info,provisioner_scheduling=debug`.
    #[serde(default = "LoggingConfig::default_filter")]
    pub filter: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    fn default_filter() -> String {
        "info".to_string()
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `PROVISIONER_LOG`: filter directives (falls back to `RUST_LOG`)
    /// - `PROVISIONER_LOG_FORMAT`: `text` or `json`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PROVISIONER_LOG").or_else(|_| std::env::var("RUST_LOG")) {
            config.filter = val;
        }
        if let Ok(val) = std::env::var("PROVISIONER_LOG_FORMAT") {
            config.format = match val.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "console" => LogFormat::Text,
                _ => config.format,
            };
        }

        config
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: Self::default_filter(),
            format: LogFormat::default(),
        }
    }
}

/// Check if an event is a debug-level scheduling decision event.
#[must_use]
pub fn is_debug_event(target: &str, level: Level) -> bool {
    target == EVENTS_TARGET && level == Level::DEBUG
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.filter)?;
    let drop_debug_events = filter_fn(|meta: &Metadata<'_>| !is_debug_event(meta.target(), *meta.level()));

    let fmt_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer.with_filter(drop_debug_events))
        .try_init()?;
    Ok(())
}
