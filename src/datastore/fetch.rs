use serde::de::DeserializeOwned;

use super::Snapshot;
use crate::errors::DataStoreError;
use crate::key::Key;
use crate::Result;

/// Typed accessors for well-known fields, bound to one snapshot.
///
/// Every accessor issues one point read and decodes the raw JSON into the
/// field's type. Absent and `null` values decode to `None`; list and flag
/// accessors fall back to the empty value, matching how the source models
/// unset fields.
#[derive(Clone, Copy)]
pub struct Fetch<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> Fetch<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Fetch { snapshot }
    }

    /// Decoded value of an arbitrary key. `None` for absent or `null`.
    pub async fn value<T>(&self, key: &Key) -> Result<Option<T>>
    where T: DeserializeOwned {
        let Some(raw) = self.snapshot.get_one(key).await? else {
            return Ok(None);
        };
        if raw.as_ref() == b"null" {
            return Ok(None);
        }
        let value = serde_json::from_slice(&raw).map_err(|source| DataStoreError::ValueDecode {
            key: key.clone(),
            source,
        })?;
        Ok(Some(value))
    }

    async fn list<T>(&self, collection: &str, id: u32, field: &str) -> Result<Vec<T>>
    where T: DeserializeOwned {
        Ok(self
            .value(&Key::new(collection, id, field))
            .await?
            .unwrap_or_default())
    }

    pub async fn meeting_enable_anonymous(&self, meeting_id: u32) -> Result<bool> {
        Ok(self
            .value(&Key::new("meeting", meeting_id, "enable_anonymous"))
            .await?
            .unwrap_or_default())
    }

    pub async fn meeting_user_ids(&self, meeting_id: u32) -> Result<Vec<u32>> {
        self.list("meeting", meeting_id, "user_ids").await
    }

    pub async fn meeting_committee_id(&self, meeting_id: u32) -> Result<Option<u32>> {
        self.value(&Key::new("meeting", meeting_id, "committee_id"))
            .await
    }

    pub async fn meeting_template_for_organization_id(&self, meeting_id: u32) -> Result<Option<u32>> {
        self.value(&Key::new(
            "meeting",
            meeting_id,
            "template_for_organization_id",
        ))
        .await
    }

    pub async fn meeting_admin_group_id(&self, meeting_id: u32) -> Result<Option<u32>> {
        self.value(&Key::new("meeting", meeting_id, "admin_group_id"))
            .await
    }

    pub async fn meeting_default_group_id(&self, meeting_id: u32) -> Result<Option<u32>> {
        self.value(&Key::new("meeting", meeting_id, "default_group_id"))
            .await
    }

    pub async fn user_organization_management_level(&self, user_id: u32) -> Result<Option<String>> {
        self.value(&Key::new("user", user_id, "organization_management_level"))
            .await
    }

    pub async fn user_committee_management_ids(&self, user_id: u32) -> Result<Vec<u32>> {
        self.list("user", user_id, "committee_management_ids").await
    }

    pub async fn user_meeting_ids(&self, user_id: u32) -> Result<Vec<u32>> {
        self.list("user", user_id, "meeting_ids").await
    }

    /// Group ids of a user in one meeting, stored in the structured field
    /// `group_$<meeting_id>_ids`.
    pub async fn user_group_ids(&self, user_id: u32, meeting_id: u32) -> Result<Vec<u32>> {
        self.list("user", user_id, &format!("group_${meeting_id}_ids"))
            .await
    }

    pub async fn group_permissions(&self, group_id: u32) -> Result<Vec<String>> {
        self.list("group", group_id, "permissions").await
    }

    pub async fn committee_user_ids(&self, committee_id: u32) -> Result<Vec<u32>> {
        self.list("committee", committee_id, "user_ids").await
    }
}
