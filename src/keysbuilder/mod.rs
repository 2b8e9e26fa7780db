//! Query-tree parsing and key expansion.
//!
//! A [`KeysBuilder`] is the parsed, validated form of one client request.
//! [`KeysBuilder::expand`] evaluates it against the current datastore values
//! and produces the saturated set of requested keys: starting from the root
//! entries, every non-leaf key is read and its descriptor dispatched until no
//! new keys appear. Each round reads its whole frontier through one batched
//! snapshot call, and the call only returns when every sub-expansion has
//! completed.

mod fields;


use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::datastore::Snapshot;
use crate::errors::JsonError;
use crate::key::Key;
use crate::Result;

use fields::Body;
pub(crate) use fields::FieldDescription;
pub(crate) use fields::FieldsMap;

/// Parsed form of one request: one or more query-tree roots.
#[derive(Debug)]
pub struct KeysBuilder {
    bodies: Vec<Body>,
}

impl KeysBuilder {
    /// Parses a request body: either one root object or a JSON array of root
    /// objects (multi-request). Validates structurally before any datastore
    /// access.
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).map_err(JsonError::from)?;
        let bodies = match &value {
            Value::Array(items) => items
                .iter()
                .map(Body::from_value)
                .collect::<Result<Vec<_>>>()?,
            _ => vec![Body::from_value(&value)?],
        };
        Ok(KeysBuilder { bodies })
    }

    /// Expands the query tree against the given snapshot to a fixed point.
    ///
    /// Malformed values are attributed to their key but do not stop the
    /// remaining branches; the first recorded error fails the call after
    /// saturation. Absent and `null` values simply yield no sub-keys.
    pub async fn expand(&self, snapshot: &Snapshot) -> Result<Expansion> {
        let mut acc = Accumulator::default();
        for body in &self.bodies {
            body.seed(&mut acc);
        }

        let mut rounds = 0usize;
        let mut first_error = None;
        while !acc.frontier.is_empty() {
            rounds += 1;
            let frontier = std::mem::take(&mut acc.frontier);
            let keys: Vec<Key> = frontier.iter().map(|(key, _)| key.clone()).collect();
            let values = snapshot.get(&keys).await?;

            for (key, description) in frontier {
                let Some(value) = values.get(&key).cloned().flatten() else {
                    continue;
                };
                if value.as_ref() == b"null" {
                    continue;
                }
                if let Err(err) = description.expand(&key, &value, &mut acc) {
                    debug!(key = %key, error = %err, "value does not match its descriptor");
                    first_error.get_or_insert(err);
                }
            }
        }
        debug!(keys = acc.data.len(), rounds, "expansion saturated");

        if let Some(err) = first_error {
            return Err(err.into());
        }
        Ok(Expansion { data: acc.data })
    }
}

/// The saturated result of one expansion: every requested key, mapped to the
/// descriptor it was reached with (`None` for leaves).
#[derive(Debug, Default)]
pub struct Expansion {
    data: HashMap<Key, Option<Arc<FieldDescription>>>,
}

impl Expansion {
    /// Every key of the saturated set, in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.data.keys()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn descriptor(&self, key: &Key) -> Option<&Option<Arc<FieldDescription>>> {
        self.data.get(key)
    }
}

/// Work state of one expansion run.
///
/// `seen` dedupes work per `(key, descriptor identity)`: the same key may be
/// reached through several paths of the tree, and every distinct descriptor
/// expands exactly once, which gives union semantics at the field level. The
/// result map never replaces a non-leaf entry with a leaf.
#[derive(Default)]
pub(crate) struct Accumulator {
    data: HashMap<Key, Option<Arc<FieldDescription>>>,
    frontier: Vec<(Key, Arc<FieldDescription>)>,
    seen: HashSet<(Key, usize)>,
}

impl Accumulator {
    pub(crate) fn add(&mut self, key: Key, description: Option<Arc<FieldDescription>>) {
        if let Some(description) = &description {
            let token = (key.clone(), Arc::as_ptr(description) as usize);
            if self.seen.insert(token) {
                self.frontier.push((key.clone(), Arc::clone(description)));
            }
        }

        match self.data.entry(key) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(description);
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                if entry.get().is_none() && description.is_some() {
                    entry.insert(description);
                }
            }
        }
    }

    pub(crate) fn add_fields(&mut self, collection: &str, id: u32, fields: &FieldsMap) {
        for (name, description) in fields {
            self.add(Key::new(collection, id, name.clone()), description.clone());
        }
    }
}
