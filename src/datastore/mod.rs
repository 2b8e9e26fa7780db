//! Read path against the external source of truth.
//!
//! The [`Datastore`] combines the [`Source`] facade with the process-wide
//! value cache and the change feed. Reads go through a [`Snapshot`]: a
//! request-scoped handle under which every value is stable, even while
//! change batches keep arriving. Applying a change batch advances the
//! datastore position, drops the affected cache entries and fans the batch
//! out to all subscriptions.

mod cache;
mod fetch;
mod memory;
mod source;

pub use fetch::Fetch;
pub use memory::MemorySource;
pub use source::ChangeBatch;
pub use source::Source;
#[cfg(test)]
pub(crate) use source::MockSource;


use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::sync::OwnedRwLockReadGuard;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::GraphfeedConfig;
use crate::key::Key;
use crate::metrics::DATASTORE_GET_CALLS;
use crate::metrics::DATASTORE_SOURCE_HITS;
use crate::Result;

use cache::ValueCache;

/// One event on the datastore's change feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// Exactly these keys changed.
    Keys(ChangeBatch),
    /// The precise set is unknown (the feed lagged); treat every key as
    /// changed.
    Reset,
}

/// Cached, snapshot-consistent read access to a [`Source`].
pub struct Datastore {
    source: Arc<dyn Source>,
    cache: ValueCache,
    cache_missing: bool,
    position: Arc<RwLock<u64>>,
    feed_tx: broadcast::Sender<ChangeEvent>,
}

impl Datastore {
    pub fn new(source: Arc<dyn Source>) -> Arc<Self> {
        Self::with_config(source, &GraphfeedConfig::default())
    }

    pub fn with_config(source: Arc<dyn Source>, config: &GraphfeedConfig) -> Arc<Self> {
        let (feed_tx, _) = broadcast::channel(config.feed.channel_capacity);
        Arc::new(Datastore {
            source,
            cache: ValueCache::new(),
            cache_missing: config.cache.cache_missing,
            position: Arc::new(RwLock::new(0)),
            feed_tx,
        })
    }

    /// Spawns the invalidator task: applies every change batch of the source
    /// to the cache and re-broadcasts it to subscriptions. The task ends when
    /// the shutdown signal fires or the source closes its feed.
    pub fn start(self: &Arc<Self>, mut shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        let datastore = Arc::clone(self);
        let mut source_rx = datastore.source.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!("datastore invalidator received shutdown signal");
                        return;
                    }

                    batch = source_rx.recv() => match batch {
                        Ok(keys) => datastore.apply_changes(ChangeEvent::Keys(keys)).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "source change feed lagged, resetting the cache");
                            datastore.apply_changes(ChangeEvent::Reset).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("source change feed closed");
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Borrows a read handle. Values read under one snapshot are stable:
    /// change batches wait for the write side of the barrier until every
    /// outstanding snapshot is dropped.
    pub async fn snapshot(self: &Arc<Self>) -> Snapshot {
        let guard = Arc::clone(&self.position).read_owned().await;
        Snapshot {
            datastore: Arc::clone(self),
            guard,
        }
    }

    /// Subscribes to the fanned-out change feed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed_tx.subscribe()
    }

    async fn apply_changes(&self, event: ChangeEvent) {
        let mut position = self.position.write().await;
        *position += 1;
        match &event {
            ChangeEvent::Keys(keys) => {
                for key in keys.iter() {
                    self.cache.invalidate(key);
                }
            }
            ChangeEvent::Reset => self.cache.clear(),
        }
        drop(position);

        // Send fails only without subscribers, which is fine.
        let _ = self.feed_tx.send(event);
    }

    async fn get(&self, keys: &[Key]) -> Result<HashMap<Key, Option<Bytes>>> {
        DATASTORE_GET_CALLS.inc();

        let mut out = HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();
        for key in keys {
            match self.cache.get(key) {
                Some(value) => {
                    out.insert(key.clone(), value);
                }
                None => misses.push(key.clone()),
            }
        }

        if !misses.is_empty() {
            DATASTORE_SOURCE_HITS.inc();
            let fetched = self.source.get(&misses).await?;
            for key in misses {
                let value = fetched.get(&key).cloned().flatten();
                if value.is_some() || self.cache_missing {
                    self.cache.insert(key.clone(), value.clone());
                }
                out.insert(key, value);
            }
        }

        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

/// Request-scoped read handle over one consistent datastore position.
pub struct Snapshot {
    datastore: Arc<Datastore>,
    guard: OwnedRwLockReadGuard<u64>,
}

impl Snapshot {
    /// The logical position this snapshot observes. Positions advance
    /// monotonically with every applied change batch.
    pub fn position(&self) -> u64 {
        *self.guard
    }

    /// Batched point reads. Every requested key appears in the result;
    /// absent keys map to `None`.
    pub async fn get(&self, keys: &[Key]) -> Result<HashMap<Key, Option<Bytes>>> {
        self.datastore.get(keys).await
    }

    /// Point read of a single key.
    pub async fn get_one(&self, key: &Key) -> Result<Option<Bytes>> {
        let mut values = self.datastore.get(std::slice::from_ref(key)).await?;
        Ok(values.remove(key).flatten())
    }
}
