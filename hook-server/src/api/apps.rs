use crate::api::service_error;
use crate::errors::ApiError;
use crate::openapi::ADMIN_TAG;
use crate::state::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct AllowAppRequest {
    /// OAuth2 client id of the application
    pub app_client_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct AllowedAppsResponse {
    pub app_client_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct AllowedGroupsResponse {
    pub group_ids: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/v0/groups/{group_id}/apps",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    responses(
        (status = 200, description = "Applications the group may use", body = AllowedAppsResponse)
    )
)]
pub(crate) async fn get_allowed_apps(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<AllowedAppsResponse>, ApiError> {
    let app_client_ids = state
        .allowlist
        .get_allowed_apps(&group_id)
        .await
        .map_err(service_error)?;
    Ok(Json(AllowedAppsResponse { app_client_ids }))
}

#[utoipa::path(
    post,
    path = "/api/v0/groups/{group_id}/apps",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    request_body = AllowAppRequest,
    responses(
        (status = 201, description = "Application allowed"),
        (status = 400, description = "Group does not exist"),
        (status = 409, description = "Application already allowed"),
        (status = 502, description = "Authorization engine failure, nothing was changed")
    )
)]
pub(crate) async fn add_allowed_app(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(input): Json<AllowAppRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .allowlist
        .add_allowed_app_to_group(&group_id, &input.app_client_id)
        .await
        .map_err(service_error)?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/api/v0/groups/{group_id}/apps",
    tag = ADMIN_TAG,
    params(("group_id" = String, Path, description = "Group id")),
    responses(
        (status = 200, description = "Applications removed from the group", body = AllowedAppsResponse),
        (status = 502, description = "Authorization engine failure, nothing was changed")
    )
)]
pub(crate) async fn remove_all_allowed_apps(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<AllowedAppsResponse>, ApiError> {
    let app_client_ids = state
        .allowlist
        .remove_all_allowed_apps_from_group(&group_id)
        .await
        .map_err(service_error)?;
    Ok(Json(AllowedAppsResponse { app_client_ids }))
}

#[utoipa::path(
    delete,
    path = "/api/v0/groups/{group_id}/apps/{app_client_id}",
    tag = ADMIN_TAG,
    params(
        ("group_id" = String, Path, description = "Group id"),
        ("app_client_id" = String, Path, description = "Application client id"),
    ),
    responses(
        (status = 204, description = "Application removed"),
        (status = 404, description = "Application was not allowed for the group"),
        (status = 502, description = "Authorization engine failure, nothing was changed")
    )
)]
pub(crate) async fn remove_allowed_app(
    State(state): State<AppState>,
    Path((group_id, app_client_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .allowlist
        .remove_allowed_app_from_group(&group_id, &app_client_id)
        .await
        .map_err(service_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v0/apps/{app_client_id}/groups",
    tag = ADMIN_TAG,
    params(("app_client_id" = String, Path, description = "Application client id")),
    responses(
        (status = 200, description = "Groups allowed to use the application", body = AllowedGroupsResponse)
    )
)]
pub(crate) async fn get_allowed_groups(
    State(state): State<AppState>,
    Path(app_client_id): Path<String>,
) -> Result<Json<AllowedGroupsResponse>, ApiError> {
    let group_ids = state
        .allowlist
        .get_allowed_groups_for_app(&app_client_id)
        .await
        .map_err(service_error)?;
    Ok(Json(AllowedGroupsResponse { group_ids }))
}

#[utoipa::path(
    delete,
    path = "/api/v0/apps/{app_client_id}/groups",
    tag = ADMIN_TAG,
    params(("app_client_id" = String, Path, description = "Application client id")),
    responses(
        (status = 200, description = "Groups removed from the application", body = AllowedGroupsResponse),
        (status = 502, description = "Authorization engine failure, nothing was changed")
    )
)]
pub(crate) async fn remove_all_allowed_groups(
    State(state): State<AppState>,
    Path(app_client_id): Path<String>,
) -> Result<Json<AllowedGroupsResponse>, ApiError> {
    let group_ids = state
        .allowlist
        .remove_all_allowed_groups_for_app(&app_client_id)
        .await
        .map_err(service_error)?;
    Ok(Json(AllowedGroupsResponse { group_ids }))
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v0/groups/{group_id}/apps",
            get(get_allowed_apps)
                .post(add_allowed_app)
                .delete(remove_all_allowed_apps),
        )
        .route(
            "/api/v0/groups/{group_id}/apps/{app_client_id}",
            delete(remove_allowed_app),
        )
        .route(
            "/api/v0/apps/{app_client_id}/groups",
            get(get_allowed_groups).delete(remove_all_allowed_groups),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Group;
    use crate::test_utils::{TestFixture, TestResponse};
    use axum::body::Body;
    use http::Method;
    use serde_json::json;

    const WRITE_PATH: &str = "/stores/test-store/write";

    async fn create(fixture: &TestFixture, name: &str) -> String {
        let response = fixture.post("/api/v0/groups", &json!({ "name": name })).await;
        response.assert_status(StatusCode::CREATED);
        response.json_as::<Group>().id
    }

    async fn delete_path(fixture: &TestFixture, path: &str) -> TestResponse {
        let request = fixture
            .request_builder(Method::DELETE, path)
            .body(Body::empty())
            .expect("Failed to build request");
        fixture.send(request).await
    }

    #[tokio::test]
    async fn test_allow_and_revoke_app() {
        let fixture = TestFixture::new().await;
        let group_id = create(&fixture, "eng").await;
        fixture
            .add_engine_mock(Method::POST, WRITE_PATH, json!({}), StatusCode::OK, 2)
            .await;
        let apps_path = format!("/api/v0/groups/{}/apps", group_id);

        fixture
            .post(&apps_path, &json!({ "app_client_id": "console" }))
            .await
            .assert_status(StatusCode::CREATED);
        fixture
            .post(&apps_path, &json!({ "app_client_id": "console" }))
            .await
            .assert_status(StatusCode::CONFLICT);

        let response = fixture.get(&apps_path).await;
        response.assert_ok();
        assert_eq!(
            response.json_as::<AllowedAppsResponse>().app_client_ids,
            vec!["console"]
        );
        let response = fixture.get("/api/v0/apps/console/groups").await;
        assert_eq!(
            response.json_as::<AllowedGroupsResponse>().group_ids,
            vec![group_id.clone()]
        );

        delete_path(&fixture, &format!("{}/console", apps_path))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        delete_path(&fixture, &format!("{}/console", apps_path))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        fixture.engine_mock.verify().await;
    }

    #[tokio::test]
    async fn test_engine_failure_is_bad_gateway_and_reverted() {
        let fixture = TestFixture::new().await;
        let group_id = create(&fixture, "eng").await;
        fixture
            .add_engine_mock(
                Method::POST,
                WRITE_PATH,
                json!({}),
                StatusCode::INTERNAL_SERVER_ERROR,
                1,
            )
            .await;
        let apps_path = format!("/api/v0/groups/{}/apps", group_id);

        fixture
            .post(&apps_path, &json!({ "app_client_id": "console" }))
            .await
            .assert_status(StatusCode::BAD_GATEWAY);

        let response = fixture.get(&apps_path).await;
        assert!(response
            .json_as::<AllowedAppsResponse>()
            .app_client_ids
            .is_empty());
    }

    #[tokio::test]
    async fn test_revoke_app_from_all_groups() {
        let fixture = TestFixture::new().await;
        let g1 = create(&fixture, "g1").await;
        let g2 = create(&fixture, "g2").await;
        fixture
            .add_engine_mock(Method::POST, WRITE_PATH, json!({}), StatusCode::OK, 3)
            .await;
        for group_id in [&g1, &g2] {
            fixture
                .post(
                    format!("/api/v0/groups/{}/apps", group_id),
                    &json!({ "app_client_id": "console" }),
                )
                .await
                .assert_status(StatusCode::CREATED);
        }

        let response = delete_path(&fixture, "/api/v0/apps/console/groups").await;
        response.assert_ok();
        let mut removed = response.json_as::<AllowedGroupsResponse>().group_ids;
        removed.sort();
        let mut expected = vec![g1, g2];
        expected.sort();
        assert_eq!(removed, expected);

        let response = fixture.get("/api/v0/apps/console/groups").await;
        assert!(response
            .json_as::<AllowedGroupsResponse>()
            .group_ids
            .is_empty());
        fixture.engine_mock.verify().await;
    }

    #[tokio::test]
    async fn test_revoke_all_apps_of_group() {
        let fixture = TestFixture::new().await;
        let group_id = create(&fixture, "eng").await;
        fixture
            .add_engine_mock(Method::POST, WRITE_PATH, json!({}), StatusCode::OK, 3)
            .await;
        let apps_path = format!("/api/v0/groups/{}/apps", group_id);
        for app in ["a", "b"] {
            fixture
                .post(&apps_path, &json!({ "app_client_id": app }))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let response = delete_path(&fixture, &apps_path).await;
        response.assert_ok();
        let mut removed = response.json_as::<AllowedAppsResponse>().app_client_ids;
        removed.sort();
        assert_eq!(removed, vec!["a", "b"]);
        fixture.engine_mock.verify().await;
    }
}
