use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

use crate::datastore::ChangeEvent;
use crate::datastore::Datastore;
use crate::key::Key;
use crate::keysbuilder::KeysBuilder;
use crate::metrics::CONNECTION_COUNT;
use crate::restrict::Restrict;
use crate::Error;
use crate::Result;

/// One emission: changed keys with their new value, gone keys as `None`.
pub type Emission = HashMap<Key, Option<Bytes>>;

/// A live binding of one query tree to one request user.
///
/// Emissions are strictly serial and observe monotonically advancing
/// datastore positions. At most one expansion runs at a time; change batches
/// arriving meanwhile are coalesced into one follow-up cycle.
pub struct Connection {
    datastore: Arc<Datastore>,
    restricter: Arc<dyn Restrict>,
    builder: KeysBuilder,
    user_id: u32,
    feed: broadcast::Receiver<ChangeEvent>,
    shutdown: watch::Receiver<()>,

    /// Keys that participated in the last expansion, before restriction.
    universe: HashSet<Key>,
    /// Values of the last emission.
    last: HashMap<Key, Bytes>,
    position: u64,
    started: bool,
    /// A cycle is owed. Survives a caller dropping `next` mid-await, so an
    /// acknowledged change batch is never lost.
    pending: bool,
    /// The last cycle failed; the universe is stale, so the next change
    /// batch triggers a recompute no matter which keys it carries.
    dirty: bool,
}

/// Result of one cycle, before diffing.
struct CycleState {
    values: HashMap<Key, Bytes>,
    universe: HashSet<Key>,
    position: u64,
}

enum Wait {
    Shutdown,
    Skip,
    Recompute,
}

impl Connection {
    pub(crate) fn new(
        datastore: Arc<Datastore>,
        restricter: Arc<dyn Restrict>,
        user_id: u32,
        builder: KeysBuilder,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        CONNECTION_COUNT.inc();
        let feed = datastore.subscribe();
        Connection {
            datastore,
            restricter,
            builder,
            user_id,
            feed,
            shutdown,
            universe: HashSet::new(),
            last: HashMap::new(),
            position: 0,
            started: false,
            pending: false,
            dirty: false,
        }
    }

    /// The next emission for this subscription.
    ///
    /// The first call yields the full filtered view; later calls block on
    /// the change feed and yield only the diff. Keys that disappeared are
    /// reported as explicit `None`; cycles whose diff is empty are not
    /// emitted. Returns `Ok(None)` once the shutdown signal fires or the
    /// feed closes. Transient datastore errors skip the emission and leave
    /// the subscription alive.
    pub async fn next(&mut self) -> Result<Option<Emission>> {
        if !self.started {
            self.pending = true;
        }
        loop {
            if self.shutdown_requested() {
                return Ok(None);
            }

            if !self.pending {
                match self.wait_for_changes().await {
                    Wait::Shutdown => return Ok(None),
                    Wait::Skip => continue,
                    Wait::Recompute => self.pending = true,
                }
            }

            let cycle = Self::cycle(
                &self.datastore,
                &self.restricter,
                &self.builder,
                self.user_id,
            );
            let outcome = tokio::select! {
                _ = self.shutdown.changed() => return Ok(None),
                outcome = cycle => outcome,
            };

            match outcome {
                Ok(state) => {
                    debug_assert!(state.position >= self.position);
                    self.pending = false;
                    self.dirty = false;
                    if let Some(emission) = self.apply(state) {
                        return Ok(Some(emission));
                    }
                }
                Err(Error::DataStore(err)) => {
                    warn!(error = %err, "cycle failed, waiting for the next change");
                    self.pending = false;
                    self.dirty = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.has_changed().unwrap_or(true)
    }

    /// Blocks until a change batch intersects the key universe of the last
    /// expansion, coalescing every batch that queued up meanwhile.
    async fn wait_for_changes(&mut self) -> Wait {
        let event = tokio::select! {
            _ = self.shutdown.changed() => return Wait::Shutdown,
            event = self.feed.recv() => event,
        };

        let mut reset = false;
        let mut changed: HashSet<Key> = HashSet::new();
        match event {
            Ok(ChangeEvent::Keys(keys)) => changed.extend(keys.iter().cloned()),
            Ok(ChangeEvent::Reset) => reset = true,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "change feed lagging, recomputing the full view");
                reset = true;
            }
            Err(broadcast::error::RecvError::Closed) => return Wait::Shutdown,
        }

        loop {
            match self.feed.try_recv() {
                Ok(ChangeEvent::Keys(keys)) => changed.extend(keys.iter().cloned()),
                Ok(ChangeEvent::Reset) => reset = true,
                Err(broadcast::error::TryRecvError::Lagged(_)) => reset = true,
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }

        if reset || self.dirty || changed.iter().any(|key| self.universe.contains(key)) {
            Wait::Recompute
        } else {
            debug!(changed = changed.len(), "change batch disjoint from request");
            Wait::Skip
        }
    }

    /// One full expansion/restriction cycle under a single snapshot.
    async fn cycle(
        datastore: &Arc<Datastore>,
        restricter: &Arc<dyn Restrict>,
        builder: &KeysBuilder,
        user_id: u32,
    ) -> Result<CycleState> {
        let snapshot = datastore.snapshot().await;
        let expansion = builder.expand(&snapshot).await?;
        let keys: Vec<Key> = expansion.keys().cloned().collect();

        let mut values = snapshot.get(&keys).await?;
        restricter.restrict(&snapshot, user_id, &mut values).await?;

        let present = values
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();
        Ok(CycleState {
            values: present,
            universe: keys.into_iter().collect(),
            position: snapshot.position(),
        })
    }

    /// Diffs the cycle result against the last emission. `None` when there
    /// is nothing to emit.
    fn apply(&mut self, state: CycleState) -> Option<Emission> {
        let mut emission = Emission::new();
        if self.started {
            for (key, value) in &state.values {
                if self.last.get(key) != Some(value) {
                    emission.insert(key.clone(), Some(value.clone()));
                }
            }
            for key in self.last.keys() {
                if !state.values.contains_key(key) {
                    emission.insert(key.clone(), None);
                }
            }
        } else {
            for (key, value) in &state.values {
                emission.insert(key.clone(), Some(value.clone()));
            }
        }

        let first = !self.started;
        self.started = true;
        self.universe = state.universe;
        self.position = state.position;
        self.last = state.values;

        if emission.is_empty() && !first {
            return None;
        }
        Some(emission)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        CONNECTION_COUNT.dec();
    }
}
