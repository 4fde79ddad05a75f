use crate::errors::{Entity, Operation, ServiceError};
use crate::models::{CreateGroup, Group, GroupMembership, UpdateGroup};
use crate::store::{Store, StoreBackend, StoreError, DEFAULT_ROLE};
use log::info;
use std::collections::HashSet;

const MAX_NAME_LENGTH: usize = 255;

/// Owns group lifecycle and membership reconciliation
#[derive(Clone)]
pub struct GroupDirectory {
    store: Store,
    tenant: String,
}

/// Drop repeated ids, keeping the first occurrence of each
fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn validate_ids(ids: &[String], field: &'static str, operation: Operation) -> Result<(), ServiceError> {
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ServiceError::validation(field, "must not be empty", operation));
    }
    Ok(())
}

impl GroupDirectory {
    pub fn new(store: Store, tenant: impl Into<String>) -> Self {
        Self {
            store,
            tenant: tenant.into(),
        }
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, ServiceError> {
        self.store
            .list_groups()
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Group, "", Operation::ListGroups))
    }

    /// Create a group. Fails with `AlreadyExists` when the name is taken in the tenant.
    pub async fn create_group(&self, mut input: CreateGroup) -> Result<Group, ServiceError> {
        let op = Operation::CreateGroup;
        input.name = input.name.trim().to_string();
        if input.name.is_empty() {
            return Err(ServiceError::validation("name", "must not be empty", op));
        }
        if input.name.len() > MAX_NAME_LENGTH {
            return Err(ServiceError::validation(
                "name",
                format!("must be at most {} characters", MAX_NAME_LENGTH),
                op,
            ));
        }
        if input.tenant_id.is_empty() {
            input.tenant_id = self.tenant.clone();
        }

        let group = self
            .store
            .create_group(&input)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Group, &input.name, op))?;
        info!("Created {} group {} ({})", group.group_type, group.name, group.id);
        Ok(group)
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Group, ServiceError> {
        self.store
            .get_group(group_id)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Group, group_id, Operation::GetGroup))
    }

    /// Update the mutable fields of a group. Renaming is rejected.
    pub async fn update_group(
        &self,
        group_id: &str,
        input: UpdateGroup,
    ) -> Result<Group, ServiceError> {
        let op = Operation::UpdateGroup;
        let current = self
            .store
            .get_group(group_id)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Group, group_id, op))?;
        if let Some(name) = &input.name {
            if name != &current.name {
                return Err(ServiceError::validation("name", "cannot be changed", op));
            }
        }

        self.store
            .update_group(group_id, &input)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Group, group_id, op))
    }

    /// Add users to a group in one write. Fails without changes if any of
    /// them is already a member or the group does not exist.
    pub async fn add_users_to_group(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<(), ServiceError> {
        let op = Operation::AddUsersToGroup;
        validate_ids(user_ids, "user_id", op)?;
        let user_ids = dedupe(user_ids);
        if user_ids.is_empty() {
            // Nothing to insert, but an unknown group is still an error.
            return match self.store.get_group(group_id).await {
                Ok(_) => Ok(()),
                Err(StoreError::NotFound) => Err(ServiceError::from_store(
                    StoreError::ForeignKeyViolation,
                    Entity::Membership,
                    group_id,
                    op,
                )),
                Err(e) => Err(ServiceError::from_store(e, Entity::Membership, group_id, op)),
            };
        }

        self.store
            .add_members(group_id, &user_ids, DEFAULT_ROLE)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Membership, group_id, op))?;
        info!("Added {} users to group {}", user_ids.len(), group_id);
        Ok(())
    }

    pub async fn list_users_in_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<GroupMembership>, ServiceError> {
        let op = Operation::ListUsersInGroup;
        self.store
            .get_group(group_id)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Group, group_id, op))?;
        self.store
            .list_members(group_id)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Membership, group_id, op))
    }

    /// Remove users from a group, returning how many memberships were deleted
    pub async fn remove_users_from_group(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<u64, ServiceError> {
        let op = Operation::RemoveUsersFromGroup;
        let removed = self
            .store
            .remove_members(group_id, &dedupe(user_ids))
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Membership, group_id, op))?;
        info!("Removed {} users from group {}", removed, group_id);
        Ok(removed)
    }

    pub async fn get_groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, ServiceError> {
        self.store.groups_for_user(user_id).await.map_err(|e| {
            ServiceError::from_store(e, Entity::Membership, user_id, Operation::GetGroupsForUser)
        })
    }

    /// Converge the user's memberships to exactly `desired_group_ids`.
    ///
    /// Memberships outside the target set are deleted first, then the target
    /// set is upserted in one statement. Existing memberships keep their
    /// `created_at` and only get `updated_at` refreshed. An unknown group id
    /// fails the upsert with `InvalidReference`; the deletions from the first
    /// phase are not restored in that case.
    pub async fn update_groups_for_user(
        &self,
        user_id: &str,
        desired_group_ids: &[String],
    ) -> Result<(), ServiceError> {
        let op = Operation::UpdateGroupsForUser;
        if user_id.trim().is_empty() {
            return Err(ServiceError::validation("user_id", "must not be empty", op));
        }
        validate_ids(desired_group_ids, "group_id", op)?;

        // A bulk upsert must not touch the same row twice.
        let desired = dedupe(desired_group_ids);

        let removed = self
            .store
            .delete_user_memberships_except(user_id, &desired)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Membership, user_id, op))?;

        if desired.is_empty() {
            info!("Cleared {} memberships of {}", removed, user_id);
            return Ok(());
        }

        self.store
            .upsert_user_memberships(user_id, &desired, DEFAULT_ROLE)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Membership, user_id, op))?;

        info!(
            "Reconciled memberships of {}: {} groups, {} removed",
            user_id,
            desired.len(),
            removed
        );
        Ok(())
    }
}
