//! Restrictions for the collection `committee`.
//!
//! Mode A: Members of the committee, committee managers and organization
//! managers.
//!
//! Mode B: Committee managers only.

use async_trait::async_trait;

use super::each_condition;
use super::CollectionPolicy;
use crate::datastore::Fetch;
use crate::restrict::perm;
use crate::Result;

pub(crate) struct Committee;

#[async_trait]
impl CollectionPolicy for Committee {
    fn name(&self) -> &'static str {
        "committee"
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
            "A" => self.see(fetch, user_id, ids).await?,
            "B" => {
                each_condition(ids, |id| async move {
                    perm::has_committee_management_level(fetch, user_id, id).await
                })
                .await?
            }
            _ => return Ok(None),
        };
        Ok(Some(allowed))
    }
}

impl Committee {
    async fn see(&self, fetch: &Fetch<'_>, user_id: u32, ids: &[u32]) -> Result<Vec<u32>> {
        if perm::has_organization_management_level(fetch, user_id, perm::OML_CAN_MANAGE_ORGANIZATION)
            .await?
        {
            return Ok(ids.to_vec());
        }
        if user_id == 0 {
            return Ok(Vec::new());
        }

        each_condition(ids, |id| async move {
            if fetch.committee_user_ids(id).await?.contains(&user_id) {
                return Ok(true);
            }
            perm::has_committee_management_level(fetch, user_id, id).await
        })
        .await
    }
}
