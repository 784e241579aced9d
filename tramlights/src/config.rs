use anyhow::{Context, Result};
use log::{debug, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tramlights_feed_lib::{DEFAULT_ENDPOINT, ROUTE_ID};
use tramlights_position_lib::{HeadingOrder, StripLayout};

/// Configurable log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }
}

/// Shortest pause allowed between refresh cycles, to stay polite to the API
pub const MIN_CYCLE_DELAY_MS: u64 = 1000;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_route_id")]
    pub route_id: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_route_id() -> String {
    ROUTE_ID.to_string()
}

const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            route_id: default_route_id(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ApiConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Retry behaviour of a single branch fetch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait after the server returned an empty body
    #[serde(default = "default_empty_body_delay_ms")]
    pub empty_body_delay_ms: u64,
    /// Wait after the first connection failure; doubles on each further one
    #[serde(default = "default_connection_error_delay_ms")]
    pub connection_error_delay_ms: u64,
    /// Upper bound for the doubling wait
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_empty_body_delay_ms() -> u64 {
    1000
}

const fn default_connection_error_delay_ms() -> u64 {
    5000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            empty_body_delay_ms: default_empty_body_delay_ms(),
            connection_error_delay_ms: default_connection_error_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_cycle_delay_ms")]
    pub cycle_delay_ms: u64,
    /// Strip brightness (0-255), applied after gamma correction
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default)]
    pub heading_order: HeadingOrder,
}

const fn default_cycle_delay_ms() -> u64 {
    10_000
}

const fn default_brightness() -> u8 {
    255
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            cycle_delay_ms: default_cycle_delay_ms(),
            brightness: default_brightness(),
            heading_order: HeadingOrder::default(),
        }
    }
}

impl Config {
    /// Clamp values to valid ranges
    pub fn validate(&mut self) {
        if self.retry.max_attempts == 0 {
            warn!("retry.max_attempts is 0, using 1");
            self.retry.max_attempts = 1;
        }
        if self.api.request_timeout_ms == 0 {
            warn!("api.request_timeout_ms is 0, using {DEFAULT_REQUEST_TIMEOUT_MS}");
            self.api.request_timeout_ms = DEFAULT_REQUEST_TIMEOUT_MS;
        }
        if self.retry.max_delay_ms < self.retry.connection_error_delay_ms {
            warn!(
                "Raising retry.max_delay_ms from {} to {}",
                self.retry.max_delay_ms, self.retry.connection_error_delay_ms
            );
            self.retry.max_delay_ms = self.retry.connection_error_delay_ms;
        }
        if self.cycle_delay_ms < MIN_CYCLE_DELAY_MS {
            warn!("Clamping cycle_delay_ms from {} to {MIN_CYCLE_DELAY_MS}", self.cycle_delay_ms);
            self.cycle_delay_ms = MIN_CYCLE_DELAY_MS;
        }
    }

    /// Read the configuration file. `Ok(None)` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        debug!("Loading config from {}", path.display());
        let buf = match std::fs::read(path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        debug!("Config file size: {} bytes", buf.len());
        let config: Self = serde_json::from_slice(&buf)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(config))
    }

    /// Load and validate the configuration, falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        let mut config = match Self::load(path) {
            Ok(Some(config)) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Ok(None) => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to load config: {e:#}, using defaults");
                Self::default()
            }
        };
        config.validate();
        config
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!("Config saved to {}", path.display());
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> StripLayout {
        StripLayout {
            heading_order: self.heading_order,
            ..StripLayout::default()
        }
    }

    pub const fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}
