use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use dashmap::DashMap;

use crate::key::Key;
use crate::metrics::DATASTORE_CACHE_KEY_LEN;
use crate::metrics::DATASTORE_CACHE_SIZE;

/// Process-wide mapping from [`Key`] to the last known raw value.
///
/// Absent keys are cached as `None` so that repeated expansion of missing
/// objects does not re-hit the source. The cache is not authoritative; it is
/// invalidated per key by the change feed.
#[derive(Debug, Default)]
pub(crate) struct ValueCache {
    entries: DashMap<Key, Option<Bytes>>,
    bytes: AtomicI64,
}

impl ValueCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry. The outer `None` is a cache miss, the inner
    /// `None` a cached "key does not exist".
    pub(crate) fn get(&self, key: &Key) -> Option<Option<Bytes>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub(crate) fn insert(&self, key: Key, value: Option<Bytes>) {
        let added = value.as_ref().map_or(0, |v| v.len() as i64);
        let removed = match self.entries.insert(key, value) {
            Some(old) => old.as_ref().map_or(0, |v| v.len() as i64),
            None => 0,
        };
        self.bytes.fetch_add(added - removed, Ordering::Relaxed);
        self.publish();
    }

    pub(crate) fn invalidate(&self, key: &Key) {
        if let Some((_, old)) = self.entries.remove(key) {
            let removed = old.as_ref().map_or(0, |v| v.len() as i64);
            self.bytes.fetch_sub(removed, Ordering::Relaxed);
        }
        self.publish();
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
        self.bytes.store(0, Ordering::Relaxed);
        self.publish();
    }

    /// Number of cached keys.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Aggregate byte size of all cached values.
    pub(crate) fn size(&self) -> i64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn publish(&self) {
        DATASTORE_CACHE_KEY_LEN.set(self.len() as i64);
        DATASTORE_CACHE_SIZE.set(self.size());
    }
}
