use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CHANGE_FEED_CAPACITY;
use crate::Result;

/// Change-feed fan-out parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedConfig {
    /// Capacity of the broadcast channel carrying change batches to
    /// subscriptions. A subscription lagging further than this recomputes its
    /// full view instead of failing.
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            channel_capacity: DEFAULT_CHANGE_FEED_CAPACITY,
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(super::validation_error("feed.channel_capacity must be > 0"));
        }
        Ok(())
    }
}
