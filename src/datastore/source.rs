use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::key::Key;
use crate::Result;

/// One batch of keys whose values changed together.
pub type ChangeBatch = Arc<Vec<Key>>;

/// Read-only facade over the external source of truth.
///
/// The point-read interface is batched; implementations are expected to
/// answer one call with one round trip. The change feed yields sets of keys
/// whose values have changed since the previous batch.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Source: Send + Sync {
    /// Batched point reads. Every requested key appears in the result;
    /// absent keys map to `None`.
    async fn get(&self, keys: &[Key]) -> Result<HashMap<Key, Option<Bytes>>>;

    /// Subscribes to the change feed. Every subscriber holds its own cursor.
    fn subscribe(&self) -> broadcast::Receiver<ChangeBatch>;
}
