//! The restriction layer.
//!
//! Given the raw key/value map of one expansion and a request user, the
//! restricter drops every key the user may not see. Fields map to named
//! modes through a static table; keys are batched by `(collection, mode)`
//! so each policy answers one call per batch. A policy error aborts the
//! whole cycle — silently omitting data would be a security hazard, but so
//! would emitting it.

pub mod perm;

mod collection;
mod field_modes;


use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use tracing::debug;

use crate::datastore::Fetch;
use crate::datastore::Snapshot;
use crate::errors::RestrictionError;
use crate::key::Key;
use crate::Error;
use crate::Result;

use collection::CollectionPolicy;

/// Middleware filtering a raw key/value map for one request user.
#[async_trait]
pub trait Restrict: Send + Sync {
    async fn restrict(
        &self,
        snapshot: &Snapshot,
        user_id: u32,
        data: &mut HashMap<Key, Option<Bytes>>,
    ) -> Result<()>;
}

/// Pass-through restricter for tests and trusted internal consumers.
pub struct RestrictAllowed;

#[async_trait]
impl Restrict for RestrictAllowed {
    async fn restrict(
        &self,
        _snapshot: &Snapshot,
        _user_id: u32,
        _data: &mut HashMap<Key, Option<Bytes>>,
    ) -> Result<()> {
        Ok(())
    }
}

/// The policy-table driven restricter.
pub struct Restricter {
    policies: HashMap<&'static str, Box<dyn CollectionPolicy>>,
}

impl Restricter {
    pub fn new() -> Self {
        let list: Vec<Box<dyn CollectionPolicy>> = vec![
            Box::new(collection::Committee),
            Box::new(collection::Meeting),
            Box::new(collection::Organization),
            Box::new(collection::User),
        ];
        let mut policies = HashMap::with_capacity(list.len());
        for policy in list {
            policies.insert(policy.name(), policy);
        }
        Restricter { policies }
    }
}

impl Default for Restricter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Restrict for Restricter {
    async fn restrict(
        &self,
        snapshot: &Snapshot,
        user_id: u32,
        data: &mut HashMap<Key, Option<Bytes>>,
    ) -> Result<()> {
        let fetch = Fetch::new(snapshot);

        // One batch per (collection, mode); ids in stable order.
        let mut batches: HashMap<(String, &'static str), BTreeSet<u32>> = HashMap::new();
        for key in data.keys() {
            let Some(mode) = key_mode(key) else { continue };
            batches
                .entry((key.collection.clone(), mode))
                .or_default()
                .insert(key.id);
        }

        let checks = batches.into_iter().map(|((collection, mode), ids)| {
            let fetch = &fetch;
            async move {
                let ids: Vec<u32> = ids.into_iter().collect();
                let Some(policy) = self.policies.get(collection.as_str()) else {
                    debug!(%collection, "no policy registered, hiding fields");
                    return Ok(((collection, mode), None));
                };
                let allowed = policy
                    .restrict_mode(fetch, user_id, mode, &ids)
                    .await
                    .map_err(|err| RestrictionError::Policy {
                        collection: collection.clone(),
                        mode: mode.to_string(),
                        reason: err.to_string(),
                    })?;
                Ok::<_, Error>((
                    (collection, mode),
                    allowed.map(|ids| ids.into_iter().collect::<HashSet<u32>>()),
                ))
            }
        });

        let mut visible: HashMap<(String, &'static str), Option<HashSet<u32>>> = HashMap::new();
        for result in join_all(checks).await {
            let (batch, allowed) = result?;
            visible.insert(batch, allowed);
        }

        data.retain(|key, _| {
            let Some(mode) = key_mode(key) else { return false };
            match visible.get(&(key.collection.clone(), mode)) {
                Some(Some(allowed)) => allowed.contains(&key.id),
                _ => false,
            }
        });
        Ok(())
    }
}

fn key_mode(key: &Key) -> Option<&'static str> {
    field_modes::field_mode(&key.collection, &field_modes::template_form(&key.field))
}
