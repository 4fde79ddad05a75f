use crate::api::{apps, groups, health, hook, users};
use crate::models::hook::{HookRequest, HookSession, SessionAugmentation, TokenHookRequest, TokenHookResponse};
use crate::models::{CreateGroup, Group, GroupMembership, GroupType, UpdateGroup};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const HOOK_TAG: &str = "Token Hook API";
pub(crate) const ADMIN_TAG: &str = "Admin API";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::ready_check,
        hook::token_hook_handler,
        groups::list_groups,
        groups::create_group,
        groups::get_group,
        groups::update_group,
        groups::delete_group,
        groups::list_users_in_group,
        groups::add_users_to_group,
        groups::remove_users_from_group,
        users::get_groups_for_user,
        users::update_groups_for_user,
        apps::get_allowed_apps,
        apps::add_allowed_app,
        apps::remove_all_allowed_apps,
        apps::remove_allowed_app,
        apps::get_allowed_groups,
        apps::remove_all_allowed_groups,
    ),
    components(schemas(
        Group,
        GroupType,
        GroupMembership,
        CreateGroup,
        UpdateGroup,
        TokenHookRequest,
        TokenHookResponse,
        HookSession,
        HookRequest,
        SessionAugmentation,
        groups::GroupUsersRequest,
        groups::RemovedUsersResponse,
        users::UserGroupsRequest,
        apps::AllowAppRequest,
        apps::AllowedAppsResponse,
        apps::AllowedGroupsResponse,
    )),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = HOOK_TAG, description = "Token issuance webhook"),
        (name = ADMIN_TAG, description = "Group, membership and allow-list management"),
    ),
    info(
        title = "Token Hook API",
        description = "Group claims and access decisions for issued tokens",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_hook_and_admin_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/ready",
            "/api/v0/hook/token",
            "/api/v0/groups/{group_id}",
            "/api/v0/users/{user_id}/groups",
            "/api/v0/groups/{group_id}/apps/{app_client_id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
