//! Per-collection restriction policies.
//!
//! Every policy decides, for a batch of ids of its collection and a named
//! mode, which of those ids the request user may see. Policies receive whole
//! batches so one datastore read can answer for all ids.

mod committee;
mod meeting;
mod organization;
mod user;

pub(crate) use committee::Committee;
pub(crate) use meeting::Meeting;
pub(crate) use organization::Organization;
pub(crate) use user::User;

use std::future::Future;

use async_trait::async_trait;

use crate::datastore::Fetch;
use crate::Result;

/// Restriction behavior of one collection.
#[async_trait]
pub(crate) trait CollectionPolicy: Send + Sync {
    /// The collection this policy handles.
    fn name(&self) -> &'static str;

    /// Locates the meeting an object belongs to. `None` for objects outside
    /// any meeting scope.
    async fn meeting_id(&self, fetch: &Fetch<'_>, id: u32) -> Result<Option<u32>>;

    /// Applies the named mode to a batch of ids, returning the visible
    /// subset. `None` means the mode is unknown for this collection, which
    /// keeps the field hidden.
    async fn restrict_mode(
        &self,
        fetch: &Fetch<'_>,
        user_id: u32,
        mode: &str,
        ids: &[u32],
    ) -> Result<Option<Vec<u32>>>;
}

/// Restricter for fields that are visible to everyone.
pub(crate) fn all_visible(ids: &[u32]) -> Vec<u32> {
    ids.to_vec()
}

/// Runs a per-id predicate over a batch, keeping the ids it confirms.
pub(crate) async fn each_condition<F, Fut>(ids: &[u32], condition: F) -> Result<Vec<u32>>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut allowed = Vec::with_capacity(ids.len());
    for &id in ids {
        if condition(id).await? {
            allowed.push(id);
        }
    }
    Ok(allowed)
}
