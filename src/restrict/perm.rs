//! Permission helpers used by the collection policies.
//!
//! All helpers are pure functions over a datastore snapshot and the
//! request-user id. User id `0` is the anonymous user.

use std::collections::HashSet;

use crate::datastore::Fetch;
use crate::Result;

/// Organization management levels, strongest first.
pub const OML_SUPERADMIN: &str = "superadmin";
pub const OML_CAN_MANAGE_ORGANIZATION: &str = "can_manage_organization";
pub const OML_CAN_MANAGE_USERS: &str = "can_manage_users";

/// Meeting permission strings checked by the shipped policies.
pub const CAN_SEE_FRONTPAGE: &str = "meeting.can_see_frontpage";
pub const CAN_SEE_LIVESTREAM: &str = "meeting.can_see_livestream";

fn oml_rank(level: &str) -> u8 {
    match level {
        OML_SUPERADMIN => 3,
        OML_CAN_MANAGE_ORGANIZATION => 2,
        OML_CAN_MANAGE_USERS => 1,
        _ => 0,
    }
}

/// Whether the user holds at least the given organization management level.
pub async fn has_organization_management_level(
    fetch: &Fetch<'_>,
    user_id: u32,
    level: &str,
) -> Result<bool> {
    if user_id == 0 {
        return Ok(false);
    }
    let required = oml_rank(level);
    if required == 0 {
        return Ok(false);
    }
    let Some(have) = fetch.user_organization_management_level(user_id).await? else {
        return Ok(false);
    };
    Ok(oml_rank(&have) >= required)
}

/// Whether the user manages the given committee, either directly or through
/// the organization management level.
pub async fn has_committee_management_level(
    fetch: &Fetch<'_>,
    user_id: u32,
    committee_id: u32,
) -> Result<bool> {
    if user_id == 0 {
        return Ok(false);
    }
    if has_organization_management_level(fetch, user_id, OML_CAN_MANAGE_ORGANIZATION).await? {
        return Ok(true);
    }
    let managed = fetch.user_committee_management_ids(user_id).await?;
    Ok(managed.contains(&committee_id))
}

/// Committees the user manages directly.
pub async fn management_level_committees(fetch: &Fetch<'_>, user_id: u32) -> Result<Vec<u32>> {
    if user_id == 0 {
        return Ok(Vec::new());
    }
    fetch.user_committee_management_ids(user_id).await
}

/// Whether the user belongs to the meeting's scope. The anonymous user is in
/// scope exactly when the meeting enables anonymous access.
pub async fn in_meeting(fetch: &Fetch<'_>, user_id: u32, meeting_id: u32) -> Result<bool> {
    if user_id == 0 {
        return fetch.meeting_enable_anonymous(meeting_id).await;
    }
    Ok(fetch.meeting_user_ids(meeting_id).await?.contains(&user_id))
}

/// The set of permissions one user holds in one meeting.
///
/// Members of the meeting's admin group hold every permission; everybody
/// else holds the union of their groups' permission lists. The anonymous
/// user falls back to the meeting's default group if anonymous access is
/// enabled.
#[derive(Debug)]
pub struct Permission {
    admin: bool,
    permissions: HashSet<String>,
}

impl Permission {
    pub async fn for_meeting(
        fetch: &Fetch<'_>,
        user_id: u32,
        meeting_id: u32,
    ) -> Result<Permission> {
        let group_ids: Vec<u32> = if user_id == 0 {
            if !fetch.meeting_enable_anonymous(meeting_id).await? {
                return Ok(Permission {
                    admin: false,
                    permissions: HashSet::new(),
                });
            }
            fetch
                .meeting_default_group_id(meeting_id)
                .await?
                .into_iter()
                .collect()
        } else {
            fetch.user_group_ids(user_id, meeting_id).await?
        };

        if let Some(admin_group_id) = fetch.meeting_admin_group_id(meeting_id).await? {
            if group_ids.contains(&admin_group_id) {
                return Ok(Permission {
                    admin: true,
                    permissions: HashSet::new(),
                });
            }
        }

        let mut permissions = HashSet::new();
        for group_id in group_ids {
            permissions.extend(fetch.group_permissions(group_id).await?);
        }
        Ok(Permission {
            admin: false,
            permissions,
        })
    }

    pub fn has(&self, permission: &str) -> bool {
        self.admin || self.permissions.contains(permission)
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }
}
