//! Restrictions for the collection `user`.
//!
//! Mode A: Always visible (the bare existence of an account).
//!
//! Mode B: The request user themselves, account managers, and users sharing
//! a meeting with the request user.

use async_trait::async_trait;

use super::all_visible;
use super::each_condition;
use super::CollectionPolicy;
use crate::datastore::Fetch;
use crate::restrict::perm;
use crate::Result;

pub(crate) struct User;

#[async_trait]
impl CollectionPolicy for User {
    fn name(&self) -> &'static str {
        "user"
    }

    async fn meeting_id(&self, _fetch: &Fetch<'_>, _id: u32) -> Result<Option<u32>> {
        Ok(None)
    }

    async fn restrict_mode(
        &self,
        fetch: &Fetch<'_>,
        user_id: u32,
        mode: &str,
        ids: &[u32],
    ) -> Result<Option<Vec<u32>>> {
        let allowed = match mode {
            "A" => all_visible(ids),
            "B" => self.see(fetch, user_id, ids).await?,
            _ => return Ok(None),
        };
        Ok(Some(allowed))
    }
}

impl User {
    async fn see(&self, fetch: &Fetch<'_>, user_id: u32, ids: &[u32]) -> Result<Vec<u32>> {
        if perm::has_organization_management_level(fetch, user_id, perm::OML_CAN_MANAGE_USERS)
            .await?
        {
            return Ok(ids.to_vec());
        }
        if user_id == 0 {
            return Ok(Vec::new());
        }

        let my_meetings = fetch.user_meeting_ids(user_id).await?;
        let my_meetings = &my_meetings;
        each_condition(ids, |id| async move {
            if id == user_id {
                return Ok(true);
            }
            let their_meetings = fetch.user_meeting_ids(id).await?;
            Ok(their_meetings
                .iter()
                .any(|meeting_id| my_meetings.contains(meeting_id)))
        })
        .await
    }
}
