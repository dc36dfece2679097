//! # Runtime Configuration
//!
//! Settings the Dispatch Engine reads at construction time.
//!
//! | Field | Default | Environment override |
//! |---|---|---|
//! | `default_auth_id` | `default` | `ROUTEWITCH_DEFAULT_AUTH` |
//! | `deadline_ms` | `30000` | `ROUTEWITCH_DEADLINE_MS` (decimal or `0x` hex) |
//! | `log` | see [`LogConfig`] | `ROUTEWITCH_LOG_*` |
//!
//! A config file is YAML, or TOML when its extension is `.toml`:
//!
//! ```yaml
//! default_auth_id: bearer
//! deadline_ms: 5000
//! log:
//!   level: debug
//!   format: json
//! ```
//!
//! ```rust
//! use routewitch::runtime_config::RuntimeConfig;
//! use std::time::Duration;
//!
//! let config = RuntimeConfig::default();
//! assert_eq!(config.deadline, Duration::from_secs(30));
//! assert_eq!(config.default_auth_id, "default");
//! ```

use crate::logging::LogConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_AUTH_ID: &str = "default";
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Auth handler id for routes that declare none.
    pub default_auth_id: String,
    /// Deadline around the auth, permission, validation and handler chain.
    #[serde(
        rename = "deadline_ms",
        serialize_with = "serialize_ms",
        deserialize_with = "deserialize_ms"
    )]
    pub deadline: Duration,
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_auth_id: DEFAULT_AUTH_ID.to_string(),
            deadline: DEFAULT_DEADLINE,
            log: LogConfig::default(),
        }
    }
}

fn serialize_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn deserialize_ms<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    match u64::deserialize(d)? {
        0 => Err(serde::de::Error::custom("deadline_ms must be greater than zero")),
        ms => Ok(Duration::from_millis(ms)),
    }
}

/// Parse a millisecond count, decimal or `0x` hex.
fn parse_ms(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

impl RuntimeConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Load a YAML (or `.toml`) file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let config: RuntimeConfig = if is_toml {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?
        };
        Ok(config.apply_env())
    }

    /// Overlay `ROUTEWITCH_*` variables that are set. Unparseable values are
    /// logged and ignored.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(id) = env::var("ROUTEWITCH_DEFAULT_AUTH") {
            if !id.trim().is_empty() {
                self.default_auth_id = id.trim().to_string();
            }
        }
        if let Ok(raw) = env::var("ROUTEWITCH_DEADLINE_MS") {
            match parse_ms(&raw) {
                Some(ms) if ms > 0 => self.deadline = Duration::from_millis(ms),
                _ => warn!(value = %raw, "Ignoring invalid ROUTEWITCH_DEADLINE_MS"),
            }
        }
        self.log = self.log.with_env();
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_default_auth_id(mut self, id: impl Into<String>) -> Self {
        self.default_auth_id = id.into();
        self
    }
}
