//! Pipeline configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`StreamConfig::default()`)
//! 2. `config/tristream.toml` (or a path given to [`StreamConfig::load_from`])
//! 3. Environment variables prefixed with `TRISTREAM_`, nested keys joined by `__`
//!
//! # Example
//! ```no_run
//! use tristream::config::StreamConfig;
//!
//! let config = StreamConfig::load()?;
//! println!("window: {}", config.stats.window_size);
//! # Ok::<(), tristream::error::StreamError>(())
//! ```

use crate::error::StreamResult;
use crate::protocol::{REPORT_HEADROOM_BYTES, SAMPLE_BYTES};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/tristream.toml";

/// Prefix for environment overrides, e.g. `TRISTREAM_STATS__WINDOW_SIZE=50`.
pub const ENV_PREFIX: &str = "TRISTREAM_";

/// Smallest send ring that can queue a full end-of-session burst and an error token
/// with the reserved slot to spare.
pub const MIN_TX_CAPACITY_BYTES: usize = REPORT_HEADROOM_BYTES + 1;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Statistics engine settings
    pub stats: StatsConfig,
    /// Ring buffer sizing
    pub buffers: BufferConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Statistics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Samples per window report
    pub window_size: usize,
}

/// Ring buffer sizing. Capacities include the slot kept vacant to tell full from empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Receive ring size in samples; one fewer can be pending at once
    pub rx_capacity_samples: usize,
    /// Send ring size in bytes
    pub tx_capacity_bytes: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "tristream".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            rx_capacity_samples: 64,
            tx_capacity_bytes: 1024,
        }
    }
}

impl BufferConfig {
    /// Receive ring size in bytes.
    pub fn rx_capacity_bytes(&self) -> usize {
        self.rx_capacity_samples.saturating_mul(SAMPLE_BYTES)
    }
}

impl StreamConfig {
    /// Load configuration from `config/tristream.toml` and environment variables
    ///
    /// A missing file is not an error; defaults and the environment still apply.
    pub fn load() -> StreamResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> StreamResult<Self> {
        let config = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    /// The provider stack used by [`StreamConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(StreamConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.stats.window_size == 0 {
            return Err("Invalid window_size 0. Must be at least 1".to_string());
        }

        if self.buffers.rx_capacity_samples < 2 {
            return Err(format!(
                "Invalid rx_capacity_samples {}. Must be at least 2",
                self.buffers.rx_capacity_samples
            ));
        }

        if self.buffers.tx_capacity_bytes < MIN_TX_CAPACITY_BYTES {
            return Err(format!(
                "Invalid tx_capacity_bytes {}. Must be at least {}",
                self.buffers.tx_capacity_bytes, MIN_TX_CAPACITY_BYTES
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
