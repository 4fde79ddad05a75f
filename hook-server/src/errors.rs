use crate::engine::EngineError;
use crate::store::StoreError;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde_json::json;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a detail message and status code
    pub fn new<S: ToString>(detail: S, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            status_code,
        }
    }

    /// Create new Internal Server Error (500) with a detail message
    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create new Bad Request Error (400) with a detail message
    pub fn bad_request<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_REQUEST)
    }

    /// Create new Bad Gateway (502) with a detail message
    pub fn bad_gateway<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_GATEWAY)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = json!({
            "detail": self.detail,
        });
        (status_code, Json(body)).into_response()
    }
}

/// The kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Group,
    Membership,
    AllowlistEntry,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Group => "group",
            Entity::Membership => "group membership",
            Entity::AllowlistEntry => "allow-list entry",
        })
    }
}

/// The service operation an error was raised by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListGroups,
    CreateGroup,
    GetGroup,
    UpdateGroup,
    DeleteGroup,
    AddUsersToGroup,
    ListUsersInGroup,
    RemoveUsersFromGroup,
    GetGroupsForUser,
    UpdateGroupsForUser,
    AddAllowedApp,
    RemoveAllowedApp,
    RemoveAllAllowedApps,
    RemoveAllAllowedGroups,
    GetAllowedApps,
    GetAllowedGroups,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::ListGroups => "list_groups",
            Operation::CreateGroup => "create_group",
            Operation::GetGroup => "get_group",
            Operation::UpdateGroup => "update_group",
            Operation::DeleteGroup => "delete_group",
            Operation::AddUsersToGroup => "add_users_to_group",
            Operation::ListUsersInGroup => "list_users_in_group",
            Operation::RemoveUsersFromGroup => "remove_users_from_group",
            Operation::GetGroupsForUser => "get_groups_for_user",
            Operation::UpdateGroupsForUser => "update_groups_for_user",
            Operation::AddAllowedApp => "add_allowed_app_to_group",
            Operation::RemoveAllowedApp => "remove_allowed_app_from_group",
            Operation::RemoveAllAllowedApps => "remove_all_allowed_apps_from_group",
            Operation::RemoveAllAllowedGroups => "remove_all_allowed_groups_for_app",
            Operation::GetAllowedApps => "get_allowed_apps",
            Operation::GetAllowedGroups => "get_allowed_groups_for_app",
        })
    }
}

/// Errors returned by the group directory and allow-list services
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} not found: {key}")]
    NotFound {
        entity: Entity,
        key: String,
        operation: Operation,
    },
    #[error("{entity} already exists: {key}")]
    AlreadyExists {
        entity: Entity,
        key: String,
        operation: Operation,
    },
    #[error("{entity} references an unknown {field} in {operation}")]
    InvalidReference {
        entity: Entity,
        field: &'static str,
        operation: Operation,
    },
    #[error("invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
        operation: Operation,
    },
    #[error("authorization engine failed during {operation}: {source}")]
    Engine {
        operation: Operation,
        source: EngineError,
    },
    #[error("internal error during {operation}: {message}")]
    Internal {
        operation: Operation,
        message: String,
    },
}

impl ServiceError {
    /// Classify a store failure for the given entity and operation
    pub fn from_store(
        err: StoreError,
        entity: Entity,
        key: impl Into<String>,
        operation: Operation,
    ) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound {
                entity,
                key: key.into(),
                operation,
            },
            StoreError::DuplicateKey => ServiceError::AlreadyExists {
                entity,
                key: key.into(),
                operation,
            },
            StoreError::ForeignKeyViolation => ServiceError::InvalidReference {
                entity,
                field: "group_id",
                operation,
            },
            StoreError::Backend(message) => ServiceError::Internal { operation, message },
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>, operation: Operation) -> Self {
        ServiceError::Validation {
            field,
            reason: reason.into(),
            operation,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            ServiceError::NotFound { operation, .. }
            | ServiceError::AlreadyExists { operation, .. }
            | ServiceError::InvalidReference { operation, .. }
            | ServiceError::Validation { operation, .. }
            | ServiceError::Engine { operation, .. }
            | ServiceError::Internal { operation, .. } => *operation,
        }
    }

    /// A group with the same name already exists in the tenant
    pub fn is_duplicate_group(&self) -> bool {
        matches!(
            self,
            ServiceError::AlreadyExists {
                entity: Entity::Group,
                ..
            }
        )
    }

    /// The application is already on the group's allow-list
    pub fn is_app_already_exists(&self) -> bool {
        matches!(
            self,
            ServiceError::AlreadyExists {
                entity: Entity::AllowlistEntry,
                ..
            }
        )
    }

    /// A referenced group does not exist
    pub fn is_invalid_group_id(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidReference {
                field: "group_id",
                ..
            }
        )
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::NotFound { .. } => ApiError::new(&err, StatusCode::NOT_FOUND),
            ServiceError::AlreadyExists { .. } => ApiError::new(&err, StatusCode::CONFLICT),
            ServiceError::InvalidReference { .. } => ApiError::bad_request(&err),
            ServiceError::Validation { .. } => {
                ApiError::new(&err, StatusCode::UNPROCESSABLE_ENTITY)
            }
            ServiceError::Engine { .. } => ApiError::bad_gateway(&err),
            ServiceError::Internal { .. } => ApiError::internal(&err),
        }
    }
}
