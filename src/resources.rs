//! Thin wrappers over [`OpenCloudClient::execute`] for users, groups and
//! universes.
//!
//! Responses are returned as dynamic JSON. To call with a different
//! credential, derive a scoped client with
//! [`OpenCloudClient::with_credential`].

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    field_mask::join_field_mask, ApiRequest, OpenCloudClient, OpenCloudError, Result, Transport,
};

const API_PREFIX: &str = "/cloud/v2";

/// Pagination and filtering for list endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub max_page_size: Option<u32>,
    pub page_token: Option<String>,
    pub filter: Option<String>,
}

impl ListOptions {
    fn apply(&self, request: ApiRequest) -> ApiRequest {
        request
            .query_opt("maxPageSize", self.max_page_size)
            .query_opt("pageToken", self.page_token.as_deref())
            .query_opt("filter", self.filter.as_deref())
    }
}

impl<T: Transport> OpenCloudClient<T> {
    pub async fn get_user(&self, user_id: u64) -> Result<Option<Value>> {
        self.execute(ApiRequest::get(format!("{API_PREFIX}/users/{user_id}")))
            .await
    }

    pub async fn get_group(&self, group_id: u64) -> Result<Option<Value>> {
        self.execute(ApiRequest::get(format!("{API_PREFIX}/groups/{group_id}")))
            .await
    }

    pub async fn list_group_memberships(
        &self,
        group_id: u64,
        options: &ListOptions,
    ) -> Result<Option<Value>> {
        let request = ApiRequest::get(format!("{API_PREFIX}/groups/{group_id}/memberships"));
        self.execute(options.apply(request)).await
    }

    pub async fn get_universe(&self, universe_id: u64) -> Result<Option<Value>> {
        self.execute(ApiRequest::get(format!(
            "{API_PREFIX}/universes/{universe_id}"
        )))
        .await
    }

    /// Partially updates a universe. Only the fields present in `body` are
    /// changed; their paths are sent as `updateMask`.
    pub async fn update_universe<B: Serialize + ?Sized>(
        &self,
        universe_id: u64,
        body: &B,
    ) -> Result<Option<Value>> {
        let body = serde_json::to_value(body)
            .map_err(|err| OpenCloudError::Encode(format!("invalid universe update: {err}")))?;
        let request = ApiRequest::patch(format!("{API_PREFIX}/universes/{universe_id}"))
            .query("updateMask", join_field_mask(&body))
            .json(&body)?;
        self.execute(request).await
    }

    pub async fn restart_universe_servers(&self, universe_id: u64) -> Result<Option<Value>> {
        let request = ApiRequest::post(format!(
            "{API_PREFIX}/universes/{universe_id}:restartServers"
        ))
        .json(&json!({}))?;
        self.execute(request).await
    }

    /// Publishes `message` to live servers subscribed to `topic`.
    pub async fn publish_universe_message(
        &self,
        universe_id: u64,
        topic: &str,
        message: &str,
    ) -> Result<Option<Value>> {
        let request = ApiRequest::post(format!(
            "{API_PREFIX}/universes/{universe_id}:publishMessage"
        ))
        .json(&json!({ "topic": topic, "message": message }))?;
        self.execute(request).await
    }
}
