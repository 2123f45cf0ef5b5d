//! Directory of users that can be assigned to a patient's care team.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::client::ApiClient;
use crate::error::AppError;

/// A workspace member that can be added to a care team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignableUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    #[serde(default)]
    users: Vec<AssignableUser>,
}

/// Client for the organization's user directory.
#[derive(Clone, Debug)]
pub struct DirectoryClient {
    api: ApiClient,
    org_id: String,
}

impl DirectoryClient {
    pub fn new(api: ApiClient, org_id: impl Into<String>) -> Self {
        Self {
            api,
            org_id: org_id.into(),
        }
    }

    /// Lists users that can be assigned, in directory order.
    pub async fn list_assignable_users(&self) -> Result<Vec<AssignableUser>, AppError> {
        let encoded: String =
            url::form_urlencoded::byte_serialize(self.org_id.as_bytes()).collect();
        let response: UserListResponse = self
            .api
            .get_json(&format!("/api/setup/slack/users/{}", encoded))
            .await?;

        info!("[DIRECTORY] Loaded {} assignable users", response.users.len());
        Ok(response.users)
    }
}
