use crate::api::service_error;
use crate::errors::ApiError;
use crate::models::Group;
use crate::openapi::ADMIN_TAG;
use crate::state::AppState;
use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Target group set for a user
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct UserGroupsRequest {
    pub group_ids: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/v0/users/{user_id}/groups",
    tag = ADMIN_TAG,
    params(("user_id" = String, Path, description = "User email or service account client id")),
    responses(
        (status = 200, description = "Groups the user belongs to", body = Vec<Group>)
    )
)]
pub(crate) async fn get_groups_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Group>>, ApiError> {
    let groups = state
        .directory
        .get_groups_for_user(&user_id)
        .await
        .map_err(service_error)?;
    Ok(Json(groups))
}

/// Replace the user's memberships with exactly the given groups
#[utoipa::path(
    put,
    path = "/api/v0/users/{user_id}/groups",
    tag = ADMIN_TAG,
    params(("user_id" = String, Path, description = "User email or service account client id")),
    request_body = UserGroupsRequest,
    responses(
        (status = 200, description = "Groups the user belongs to after reconciliation", body = Vec<Group>),
        (status = 400, description = "A group does not exist")
    )
)]
pub(crate) async fn update_groups_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(input): Json<UserGroupsRequest>,
) -> Result<Json<Vec<Group>>, ApiError> {
    state
        .directory
        .update_groups_for_user(&user_id, &input.group_ids)
        .await
        .map_err(service_error)?;
    get_groups_for_user(State(state), Path(user_id)).await
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route(
        "/api/v0/users/{user_id}/groups",
        get(get_groups_for_user).put(update_groups_for_user),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestFixture, TestResponse};
    use axum::body::Body;
    use http::{Method, StatusCode};
    use serde_json::json;

    async fn put_groups(fixture: &TestFixture, user_id: &str, group_ids: &[&str]) -> TestResponse {
        let request = fixture
            .request_builder(Method::PUT, format!("/api/v0/users/{}/groups", user_id))
            .body(Body::from(json!({ "group_ids": group_ids }).to_string()))
            .expect("Failed to build request");
        fixture.send(request).await
    }

    async fn create(fixture: &TestFixture, name: &str) -> String {
        let response = fixture.post("/api/v0/groups", &json!({ "name": name })).await;
        response.assert_status(StatusCode::CREATED);
        response.json_as::<Group>().id
    }

    #[tokio::test]
    async fn test_reconcile_user_groups() {
        let fixture = TestFixture::new().await;
        let eng = create(&fixture, "eng").await;
        let ops = create(&fixture, "ops").await;

        let response = put_groups(&fixture, "alice@example.com", &[eng.as_str(), ops.as_str(), eng.as_str()]).await;
        response.assert_ok();
        assert_eq!(response.json_as::<Vec<Group>>().len(), 2);

        let response = put_groups(&fixture, "alice@example.com", &[ops.as_str()]).await;
        response.assert_ok();
        let groups = response.json_as::<Vec<Group>>();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "ops");

        let response = fixture.get("/api/v0/users/alice@example.com/groups").await;
        response.assert_ok();
        assert_eq!(response.json_as::<Vec<Group>>().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_group_is_bad_request() {
        let fixture = TestFixture::new().await;
        let eng = create(&fixture, "eng").await;

        let response = put_groups(&fixture, "alice", &[eng.as_str(), "sales"]).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json["detail"]
            .as_str()
            .unwrap()
            .contains("update_groups_for_user"));
    }
}
