//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a JSON
//! or pretty `fmt` layer. `RUST_LOG` wins over the configured level when it
//! is set. Output goes to stderr so that CLI commands can write artefacts
//! to stdout.
//!
//! Environment variables read by [`LogConfig::from_env`]:
//!
//! | Variable | Default |
//! |---|---|
//! | `ROUTEWITCH_LOG_LEVEL` | `info` |
//! | `ROUTEWITCH_LOG_FORMAT` | `pretty` (`json` for machine output) |
//! | `ROUTEWITCH_LOG_TARGET_FILTER` | unset, comma-separated directives |
//! | `ROUTEWITCH_LOG_INCLUDE_LOCATION` | `false` |
//! | `ROUTEWITCH_LOG_ASYNC` | `false` |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub level: String,
    pub format: LogFormat,
    /// Extra `EnvFilter` directives, comma-separated.
    pub target_filter: Option<String>,
    /// Include file:line in every event.
    pub include_location: bool,
    /// Write through a non-blocking background worker.
    pub async_logging: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: false,
            async_logging: false,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay any `ROUTEWITCH_LOG_*` variables that are set.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Ok(level) = env::var("ROUTEWITCH_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("ROUTEWITCH_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        if let Ok(filter) = env::var("ROUTEWITCH_LOG_TARGET_FILTER") {
            self.target_filter = Some(filter);
        }
        if let Some(v) = env_flag("ROUTEWITCH_LOG_INCLUDE_LOCATION") {
            self.include_location = v;
        }
        if let Some(v) = env_flag("ROUTEWITCH_LOG_ASYNC") {
            self.async_logging = v;
        }
        self
    }

    fn level(&self) -> Level {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

/// Keeps the background writer alive. Dropping it flushes pending events.
#[derive(Debug)]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let (writer, worker) = if config.async_logging {
        let (w, guard) = tracing_appender::non_blocking(std::io::stderr());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(w), Some(guard))
    } else {
        (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stderr),
            None,
        )
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogGuard { _worker: worker })
}
