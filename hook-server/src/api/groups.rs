use crate::api::service_error;
use crate::errors::ApiError;
use crate::models::{CreateGroup, Group, GroupMembership, UpdateGroup};
use crate::openapi::ADMIN_TAG;
use crate::state::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Users to add to or remove from a group
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct GroupUsersRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct RemovedUsersResponse {
    /// Number of memberships deleted
    pub removed: u64,
}

#[utoipa::path(
    get,
    path = "/api/v0/groups",
    tag = ADMIN_TAG,
    responses(
        (status = 200, description = "All groups", body = Vec<Group>)
    )
)]
pub(crate) async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<Group>>, ApiError> {
    let groups = state.directory.list_groups().await.map_err(service_error)?;
    Ok(Json(groups))
}

#[utoipa::path(
    post,
    path = "/api/v0/groups",
    tag = ADMIN_TAG,
    request_body = CreateGroup,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 409, description = "A group with this name already exists"),
        (status = 422, description = "Invalid group")
    )
)]
pub(crate) async fn create_group(
    State(state): State<AppState>,
    Json(input): Json<CreateGroup>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let group = state.directory.create_group(input).await.map_err(service_error)?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/api/v0/groups/{group_id}",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    responses(
        (status = 200, description = "The group", body = Group),
        (status = 404, description = "Group not found")
    )
)]
pub(crate) async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<Group>, ApiError> {
    let group = state.directory.get_group(&group_id).await.map_err(service_error)?;
    Ok(Json(group))
}

#[utoipa::path(
    patch,
    path = "/api/v0/groups/{group_id}",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    request_body = UpdateGroup,
    responses(
        (status = 200, description = "Updated group", body = Group),
        (status = 404, description = "Group not found"),
        (status = 422, description = "Attempt to rename the group")
    )
)]
pub(crate) async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(input): Json<UpdateGroup>,
) -> Result<Json<Group>, ApiError> {
    let group = state
        .directory
        .update_group(&group_id, input)
        .await
        .map_err(service_error)?;
    Ok(Json(group))
}

/// Deleting a group revokes its allow-list through the engine first, so no
/// engine tuple outlives the group.
#[utoipa::path(
    delete,
    path = "/api/v0/groups/{group_id}",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 404, description = "Group not found"),
        (status = 502, description = "Authorization engine failure")
    )
)]
pub(crate) async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .allowlist
        .delete_group(&group_id)
        .await
        .map_err(service_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v0/groups/{group_id}/users",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    responses(
        (status = 200, description = "Memberships of the group", body = Vec<GroupMembership>),
        (status = 404, description = "Group not found")
    )
)]
pub(crate) async fn list_users_in_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<GroupMembership>>, ApiError> {
    let members = state
        .directory
        .list_users_in_group(&group_id)
        .await
        .map_err(service_error)?;
    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/api/v0/groups/{group_id}/users",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    request_body = GroupUsersRequest,
    responses(
        (status = 204, description = "Users added"),
        (status = 400, description = "Group does not exist"),
        (status = 409, description = "A user is already a member")
    )
)]
pub(crate) async fn add_users_to_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(input): Json<GroupUsersRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .directory
        .add_users_to_group(&group_id, &input.user_ids)
        .await
        .map_err(service_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v0/groups/{group_id}/users",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    request_body = GroupUsersRequest,
    responses(
        (status = 200, description = "Users removed", body = RemovedUsersResponse)
    )
)]
pub(crate) async fn remove_users_from_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(input): Json<GroupUsersRequest>,
) -> Result<Json<RemovedUsersResponse>, ApiError> {
    let removed = state
        .directory
        .remove_users_from_group(&group_id, &input.user_ids)
        .await
        .map_err(service_error)?;
    Ok(Json(RemovedUsersResponse { removed }))
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v0/groups", get(list_groups).post(create_group))
        .route(
            "/api/v0/groups/{group_id}",
            get(get_group).patch(update_group).delete(delete_group),
        )
        .route(
            "/api/v0/groups/{group_id}/users",
            get(list_users_in_group)
                .post(add_users_to_group)
                .delete(remove_users_from_group),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use axum::body::Body;
    use http::Method;
    use serde_json::json;

    async fn create(fixture: &TestFixture, name: &str) -> Group {
        let response = fixture
            .post("/api/v0/groups", &json!({ "name": name, "description": "test" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json_as::<Group>()
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let fixture = TestFixture::new().await;
        let group = create(&fixture, "eng").await;
        assert_eq!(group.tenant_id, "default");

        let response = fixture.get(format!("/api/v0/groups/{}", group.id)).await;
        response.assert_ok();
        assert_eq!(response.json_as::<Group>().name, "eng");

        let response = fixture.get("/api/v0/groups").await;
        response.assert_ok();
        assert_eq!(response.json_as::<Vec<Group>>().len(), 1);

        let request = fixture
            .request_builder(Method::PATCH, format!("/api/v0/groups/{}", group.id))
            .body(Body::from(json!({ "description": "engineering" }).to_string()))
            .expect("Failed to build request");
        let response = fixture.send(request).await;
        response.assert_ok();
        assert_eq!(response.json["description"], "engineering");
        assert_eq!(response.json["type"], "local");
    }

    #[tokio::test]
    async fn test_duplicate_group_conflicts() {
        let fixture = TestFixture::new().await;
        create(&fixture, "eng").await;

        let response = fixture.post("/api/v0/groups", &json!({ "name": "eng" })).await;
        response.assert_status(StatusCode::CONFLICT);
        assert!(response.json["detail"].as_str().unwrap().contains("eng"));
    }

    #[tokio::test]
    async fn test_rename_is_rejected() {
        let fixture = TestFixture::new().await;
        let group = create(&fixture, "eng").await;

        let request = fixture
            .request_builder(Method::PATCH, format!("/api/v0/groups/{}", group.id))
            .body(Body::from(json!({ "name": "platform" }).to_string()))
            .expect("Failed to build request");
        fixture
            .send(request)
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_group_is_not_found() {
        let fixture = TestFixture::new().await;
        fixture
            .get("/api/v0/groups/missing")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        fixture
            .get("/api/v0/groups/missing/users")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_membership_endpoints() {
        let fixture = TestFixture::new().await;
        let group = create(&fixture, "eng").await;
        let users_path = format!("/api/v0/groups/{}/users", group.id);

        fixture
            .post(&users_path, &json!({ "user_ids": ["alice", "bob"] }))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        fixture
            .post(&users_path, &json!({ "user_ids": ["alice"] }))
            .await
            .assert_status(StatusCode::CONFLICT);
        fixture
            .post("/api/v0/groups/missing/users", &json!({ "user_ids": ["alice"] }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let response = fixture.get(&users_path).await;
        response.assert_ok();
        assert_eq!(response.json_as::<Vec<GroupMembership>>().len(), 2);

        let request = fixture
            .request_builder(Method::DELETE, &users_path)
            .body(Body::from(json!({ "user_ids": ["bob"] }).to_string()))
            .expect("Failed to build request");
        let response = fixture.send(request).await;
        response.assert_ok();
        assert_eq!(response.json_as::<RemovedUsersResponse>().removed, 1);
    }

    #[tokio::test]
    async fn test_delete_group_revokes_allowlist_first() {
        let fixture = TestFixture::new().await;
        let group = create(&fixture, "eng").await;
        fixture
            .add_engine_mock(
                Method::POST,
                "/stores/test-store/write",
                json!({}),
                StatusCode::OK,
                2,
            )
            .await;
        fixture
            .post(
                format!("/api/v0/groups/{}/apps", group.id),
                &json!({ "app_client_id": "console" }),
            )
            .await
            .assert_status(StatusCode::CREATED);

        let request = fixture
            .request_builder(Method::DELETE, format!("/api/v0/groups/{}", group.id))
            .body(Body::empty())
            .expect("Failed to build request");
        fixture
            .send(request)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = fixture.get("/api/v0/apps/console/groups").await;
        response.assert_ok();
        assert_eq!(response.json["group_ids"], json!([]));
        fixture.engine_mock.verify().await;
    }
}
