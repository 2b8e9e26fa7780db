//! Restrictions for the collection `organization`.
//!
//! Mode A: Always visible to everyone.
//!
//! Mode B: Organization managers only.

use async_trait::async_trait;

use super::all_visible;
use super::CollectionPolicy;
use crate::datastore::Fetch;
use crate::restrict::perm;
use crate::Result;

pub(crate) struct Organization;

#[async_trait]
impl CollectionPolicy for Organization {
    fn name(&self) -> &'static str {
        "organization"
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
            "B" => {
                if perm::has_organization_management_level(
                    fetch,
                    user_id,
                    perm::OML_CAN_MANAGE_ORGANIZATION,
                )
                .await?
                {
                    all_visible(ids)
                } else {
                    Vec::new()
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(allowed))
    }
}
