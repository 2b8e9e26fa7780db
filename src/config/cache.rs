use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Value cache behavior.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Whether absent keys are cached as negative entries. Disabling this
    /// makes every expansion of a missing object hit the source again.
    pub cache_missing: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { cache_missing: true }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
