use crate::config::{AppConfig, StoreKind};
use crate::models::{AppAllowlistEntry, CreateGroup, Group, GroupMembership, UpdateGroup};
use thiserror::Error;

pub mod memory;
pub mod postgres;

/// Role stamped on memberships created without an explicit one
pub const DEFAULT_ROLE: &str = "member";

/// Outcome of a store call that did not succeed
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    DuplicateKey,
    #[error("referenced record does not exist")]
    ForeignKeyViolation,
    #[error("store error: {0}")]
    Backend(String),
}

/// Typed access to groups, memberships and allow-list entries.
///
/// Implementations classify constraint failures into [`StoreError`] so the
/// service layer never has to inspect backend specific errors.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;

    async fn create_group(&self, input: &CreateGroup) -> Result<Group, StoreError>;

    async fn get_group(&self, group_id: &str) -> Result<Group, StoreError>;

    async fn update_group(&self, group_id: &str, input: &UpdateGroup)
        -> Result<Group, StoreError>;

    /// Delete a group together with its memberships and allow-list entries
    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError>;

    /// Insert new memberships, failing if any of them already exists
    async fn add_members(
        &self,
        group_id: &str,
        user_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError>;

    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError>;

    async fn remove_members(&self, group_id: &str, user_ids: &[String]) -> Result<u64, StoreError>;

    async fn groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError>;

    async fn memberships_for_user(&self, user_id: &str)
        -> Result<Vec<GroupMembership>, StoreError>;

    /// Delete every membership of the user whose group is not in `keep`
    async fn delete_user_memberships_except(
        &self,
        user_id: &str,
        keep: &[String],
    ) -> Result<u64, StoreError>;

    /// Insert missing memberships and touch `updated_at` on existing ones.
    /// `group_ids` must not contain duplicates.
    async fn upsert_user_memberships(
        &self,
        user_id: &str,
        group_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError>;

    async fn insert_allowlist_entries(
        &self,
        entries: &[AppAllowlistEntry],
    ) -> Result<(), StoreError>;

    async fn delete_allowlist_entry(&self, entry: &AppAllowlistEntry) -> Result<(), StoreError>;

    /// Delete and return every entry of the group
    async fn delete_allowlist_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError>;

    /// Delete and return every entry of the application
    async fn delete_allowlist_for_app(
        &self,
        app_client_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError>;

    async fn allowed_apps(&self, group_id: &str) -> Result<Vec<String>, StoreError>;

    async fn allowed_groups(&self, app_client_id: &str) -> Result<Vec<String>, StoreError>;

    async fn health_check(&self) -> Result<(), String>;
}

/// Store implementation selected at startup.
///
/// Dispatches to the configured backend so the rest of the service can hold
/// a single concrete type.
#[derive(Clone)]
pub enum Store {
    Postgres(postgres::PostgresStore),
    InMemory(memory::InMemoryStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Store::Postgres($store) => $call,
            Store::InMemory($store) => $call,
        }
    };
}

#[async_trait::async_trait]
impl StoreBackend for Store {
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        dispatch!(self, s => s.list_groups().await)
    }

    async fn create_group(&self, input: &CreateGroup) -> Result<Group, StoreError> {
        dispatch!(self, s => s.create_group(input).await)
    }

    async fn get_group(&self, group_id: &str) -> Result<Group, StoreError> {
        dispatch!(self, s => s.get_group(group_id).await)
    }

    async fn update_group(
        &self,
        group_id: &str,
        input: &UpdateGroup,
    ) -> Result<Group, StoreError> {
        dispatch!(self, s => s.update_group(group_id, input).await)
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError> {
        dispatch!(self, s => s.delete_group(group_id).await)
    }

    async fn add_members(
        &self,
        group_id: &str,
        user_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError> {
        dispatch!(self, s => s.add_members(group_id, user_ids, role).await)
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
        dispatch!(self, s => s.list_members(group_id).await)
    }

    async fn remove_members(&self, group_id: &str, user_ids: &[String]) -> Result<u64, StoreError> {
        dispatch!(self, s => s.remove_members(group_id, user_ids).await)
    }

    async fn groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError> {
        dispatch!(self, s => s.groups_for_user(user_id).await)
    }

    async fn memberships_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        dispatch!(self, s => s.memberships_for_user(user_id).await)
    }

    async fn delete_user_memberships_except(
        &self,
        user_id: &str,
        keep: &[String],
    ) -> Result<u64, StoreError> {
        dispatch!(self, s => s.delete_user_memberships_except(user_id, keep).await)
    }

    async fn upsert_user_memberships(
        &self,
        user_id: &str,
        group_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError> {
        dispatch!(self, s => s.upsert_user_memberships(user_id, group_ids, role).await)
    }

    async fn insert_allowlist_entries(
        &self,
        entries: &[AppAllowlistEntry],
    ) -> Result<(), StoreError> {
        dispatch!(self, s => s.insert_allowlist_entries(entries).await)
    }

    async fn delete_allowlist_entry(&self, entry: &AppAllowlistEntry) -> Result<(), StoreError> {
        dispatch!(self, s => s.delete_allowlist_entry(entry).await)
    }

    async fn delete_allowlist_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError> {
        dispatch!(self, s => s.delete_allowlist_for_group(group_id).await)
    }

    async fn delete_allowlist_for_app(
        &self,
        app_client_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError> {
        dispatch!(self, s => s.delete_allowlist_for_app(app_client_id).await)
    }

    async fn allowed_apps(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        dispatch!(self, s => s.allowed_apps(group_id).await)
    }

    async fn allowed_groups(&self, app_client_id: &str) -> Result<Vec<String>, StoreError> {
        dispatch!(self, s => s.allowed_groups(app_client_id).await)
    }

    async fn health_check(&self) -> Result<(), String> {
        dispatch!(self, s => s.health_check().await)
    }
}

/// Create the store backend named in the configuration.
///
/// For Postgres this opens the pool and, unless disabled, applies the
/// embedded migrations before returning.
pub async fn create_store(config: &AppConfig) -> Result<Store, StoreError> {
    match config.store.backend {
        StoreKind::Postgres => {
            if config.store.url.is_empty() {
                return Err(StoreError::Backend(
                    "store url is required for the postgres backend".to_string(),
                ));
            }
            let store = postgres::PostgresStore::connect(&config.store).await?;
            if config.store.run_migrations {
                store.run_migrations().await?;
            }
            Ok(Store::Postgres(store))
        }
        StoreKind::InMemory => Ok(Store::InMemory(memory::InMemoryStore::new())),
    }
}
