//! Bridge configuration
//!
//! Settings can be built in code with [`BridgeConfigBuilder`] or loaded from
//! a TOML document:
//!
//! ```toml
//! queue_limit = 64
//! worker_threads = 4
//! max_pathname = 4096
//! name_prefix = "bridge"
//! ```

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outstanding bridged calls allowed per endpoint before callers block
pub const DEFAULT_QUEUE_LIMIT: usize = 64;

/// Longest path the VFS reports to SQLite (`mxPathname`)
pub const DEFAULT_MAX_PATHNAME: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Capacity of each endpoint queue (VFS registration or row sink)
    pub queue_limit: usize,

    /// Number of threads in the work pool running open/exec/close
    pub worker_threads: usize,

    /// Maximum path length accepted by the VFS
    pub max_pathname: usize,

    /// Prefix for the randomly generated VFS names
    pub name_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            queue_limit: DEFAULT_QUEUE_LIMIT,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_pathname: DEFAULT_MAX_PATHNAME,
            name_prefix: "bridge".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_limit == 0 {
            return Err(BridgeError::Config("queue_limit must be at least 1".into()));
        }
        if self.worker_threads == 0 {
            return Err(BridgeError::Config(
                "worker_threads must be at least 1".into(),
            ));
        }
        // SQLite needs room for "<db>-journal" and "<db>-wal"
        if self.max_pathname < 64 {
            return Err(BridgeError::Config(format!(
                "max_pathname must be at least 64, got {}",
                self.max_pathname
            )));
        }
        if self.name_prefix.is_empty() || self.name_prefix.contains('\0') {
            return Err(BridgeError::Config(
                "name_prefix must be non-empty and contain no NUL bytes".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`BridgeConfig`]
///
/// # Examples
///
/// ```rust
/// use vfs_bridge::BridgeConfigBuilder;
///
/// # fn main() -> vfs_bridge::Result<()> {
/// let config = BridgeConfigBuilder::new()
///     .queue_limit(16)
///     .worker_threads(2)
///     .build()?;
/// assert_eq!(config.queue_limit, 16);
/// # Ok(())
/// # }
/// ```
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn new() -> Self {
        BridgeConfigBuilder {
            config: BridgeConfig::default(),
        }
    }

    pub fn queue_limit(mut self, limit: usize) -> Self {
        self.config.queue_limit = limit;
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    pub fn max_pathname(mut self, max: usize) -> Self {
        self.config.max_pathname = max;
        self
    }

    pub fn name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.name_prefix = prefix.into();
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<BridgeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
