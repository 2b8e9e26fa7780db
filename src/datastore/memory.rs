use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

use super::source::ChangeBatch;
use super::source::Source;
use crate::constants::DEFAULT_CHANGE_FEED_CAPACITY;
use crate::errors::DataStoreError;
use crate::errors::JsonError;
use crate::key::Key;
use crate::key::RE_COLLECTION;
use crate::key::RE_FIELD;
use crate::Result;

/// In-memory [`Source`] holding all values in a map.
///
/// Useful as the backing source in tests and for embedding the engine
/// without an external datastore. Mutations publish precise change batches
/// on the change feed.
#[derive(Debug)]
pub struct MemorySource {
    values: RwLock<HashMap<Key, Bytes>>,
    feed_tx: broadcast::Sender<ChangeBatch>,
}

impl MemorySource {
    pub fn new() -> Self {
        let (feed_tx, _) = broadcast::channel(DEFAULT_CHANGE_FEED_CAPACITY);
        MemorySource {
            values: RwLock::new(HashMap::new()),
            feed_tx,
        }
    }

    /// Builds a source from `(fqid, json-object)` pairs. Every attribute of
    /// an object becomes one key, e.g. `("user/1", r#"{"name": "ada"}"#)`
    /// stores `user/1/name`.
    pub fn from_objects<'a, I>(objects: I) -> Result<Self>
    where I: IntoIterator<Item = (&'a str, &'a str)> {
        let source = Self::new();
        {
            let mut values = source.values.write();
            for (fqid, object) in objects {
                let (collection, id) = Key::split_fqid(fqid)
                    .filter(|(collection, _)| RE_COLLECTION.is_match(collection))
                    .ok_or_else(|| DataStoreError::InvalidKey(fqid.to_string()))?;

                let attributes: serde_json::Map<String, Value> =
                    serde_json::from_str(object).map_err(JsonError::from)?;
                for (field, value) in attributes {
                    if !RE_FIELD.is_match(&field) {
                        return Err(DataStoreError::InvalidKey(format!("{fqid}/{field}")).into());
                    }
                    let raw = serde_json::to_vec(&value).map_err(JsonError::from)?;
                    values.insert(Key::new(collection, id, field), Bytes::from(raw));
                }
            }
        }
        Ok(source)
    }

    /// Sets or removes a batch of values and publishes one change batch for
    /// exactly the touched keys.
    pub fn apply<I>(&self, changes: I)
    where I: IntoIterator<Item = (Key, Option<Bytes>)> {
        let mut changed = Vec::new();
        {
            let mut values = self.values.write();
            for (key, value) in changes {
                match value {
                    Some(value) => {
                        values.insert(key.clone(), value);
                    }
                    None => {
                        values.remove(&key);
                    }
                }
                changed.push(key);
            }
        }
        if !changed.is_empty() {
            // Send fails only without subscribers, which is fine.
            let _ = self.feed_tx.send(Arc::new(changed));
        }
    }

    pub fn set(&self, key: Key, value: impl Into<Bytes>) {
        self.apply([(key, Some(value.into()))]);
    }

    pub fn remove(&self, key: Key) {
        self.apply([(key, None)]);
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn get(&self, keys: &[Key]) -> Result<HashMap<Key, Option<Bytes>>> {
        let values = self.values.read();
        Ok(keys
            .iter()
            .map(|key| (key.clone(), values.get(key).cloned()))
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.feed_tx.subscribe()
    }
}
