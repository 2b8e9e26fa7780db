//! Restrictions for the collection `meeting`.
//!
//! The user can see a meeting if one of the following is true:
//!
//! - `meeting/enable_anonymous` is set.
//! - The user is in `meeting/user_ids`.
//! - The user manages the meeting's committee.
//! - The meeting is a template meeting and the user manages any committee.
//! - The user has the organization management level `can_manage_organization`.
//!
//! Mode A: Always visible to everyone.
//!
//! Mode B: The user can see the meeting.
//!
//! Mode C: The user has `meeting.can_see_frontpage`.
//!
//! Mode D: The user has `meeting.can_see_livestream`.

use async_trait::async_trait;

use super::all_visible;
use super::each_condition;
use super::CollectionPolicy;
use crate::datastore::Fetch;
use crate::restrict::perm;
use crate::Result;

pub(crate) struct Meeting;

#[async_trait]
impl CollectionPolicy for Meeting {
    fn name(&self) -> &'static str {
        "meeting"
    }

    async fn meeting_id(&self, _fetch: &Fetch<'_>, id: u32) -> Result<Option<u32>> {
        Ok(Some(id))
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
            "C" => {
                self.with_permission(fetch, user_id, ids, perm::CAN_SEE_FRONTPAGE)
                    .await?
            }
            "D" => {
                self.with_permission(fetch, user_id, ids, perm::CAN_SEE_LIVESTREAM)
                    .await?
            }
            _ => return Ok(None),
        };
        Ok(Some(allowed))
    }
}

impl Meeting {
    /// The composite "can see" rule behind mode B.
    async fn see(
        &self,
        fetch: &Fetch<'_>,
        user_id: u32,
        meeting_ids: &[u32],
    ) -> Result<Vec<u32>> {
        if perm::has_organization_management_level(fetch, user_id, perm::OML_CAN_MANAGE_ORGANIZATION)
            .await?
        {
            return Ok(meeting_ids.to_vec());
        }

        let managed_committees = perm::management_level_committees(fetch, user_id).await?;
        let managed = &managed_committees;
        each_condition(meeting_ids, |meeting_id| async move {
            if fetch.meeting_enable_anonymous(meeting_id).await? {
                return Ok(true);
            }
            if user_id == 0 {
                return Ok(false);
            }

            if fetch.meeting_user_ids(meeting_id).await?.contains(&user_id) {
                return Ok(true);
            }

            if let Some(committee_id) = fetch.meeting_committee_id(meeting_id).await? {
                if perm::has_committee_management_level(fetch, user_id, committee_id).await? {
                    return Ok(true);
                }
            }

            let is_template = fetch
                .meeting_template_for_organization_id(meeting_id)
                .await?
                .is_some();
            Ok(is_template && !managed.is_empty())
        })
        .await
    }

    async fn with_permission(
        &self,
        fetch: &Fetch<'_>,
        user_id: u32,
        meeting_ids: &[u32],
        permission: &str,
    ) -> Result<Vec<u32>> {
        each_condition(meeting_ids, |meeting_id| async move {
            let perms = perm::Permission::for_meeting(fetch, user_id, meeting_id).await?;
            Ok(perms.has(permission))
        })
        .await
    }
}
