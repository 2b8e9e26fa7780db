//! Configuration for the graphfeed core.
//!
//! Hierarchical loading with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`GRAPHFEED__` prefix)
//! - Component-wise validation
mod cache;
mod feed;

pub use cache::*;
pub use feed::*;


use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the graphfeed components.
///
/// Sources are merged in the following order (later sources override earlier
/// ones):
/// 1. Type defaults (lowest priority)
/// 2. Configuration file from the `CONFIG_PATH` environment variable
/// 3. Environment variables with `GRAPHFEED__` prefix (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GraphfeedConfig {
    /// Change-feed fan-out parameters
    pub feed: FeedConfig,
    /// Value cache behavior
    pub cache: CacheConfig,
}

impl GraphfeedConfig {
    /// Loads the merged configuration.
    ///
    /// # Example
    /// ```ignore
    /// std::env::set_var("GRAPHFEED__FEED__CHANNEL_CAPACITY", "512");
    /// let cfg = GraphfeedConfig::new()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("GRAPHFEED")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Creates a new configuration with additional overrides.
    ///
    /// Merging order (later sources override earlier ones):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    ///
    /// # Example
    /// ```ignore
    /// let base = GraphfeedConfig::new()?;
    /// let final_cfg = base.with_overrides("runtime_overrides.toml")?;
    /// ```
    pub fn with_overrides(&self, path: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("GRAPHFEED")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every component section.
    pub fn validate(&self) -> Result<()> {
        self.feed.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

pub(crate) fn validation_error(msg: &str) -> crate::Error {
    ConfigError::Message(msg.to_string()).into()
}
