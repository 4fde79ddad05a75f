use crate::engine::{EngineClient, EngineError};
use crate::errors::{Entity, Operation, ServiceError};
use crate::models::AppAllowlistEntry;
use crate::services::keyed_lock::{app_key, group_key, KeyedLock};
use crate::store::{Store, StoreBackend, StoreError};
use log::{error, info, warn};

/// Keeps the relational allow-list and the authorization engine in step.
///
/// Every mutation commits to the store first and then mirrors the change
/// into the engine. When the engine call fails the store change is undone
/// with exactly one compensating write. Each mutation holds the advisory
/// locks of the groups and applications it touches from the store write
/// until compensation has finished.
#[derive(Clone)]
pub struct AllowlistService {
    store: Store,
    engine: EngineClient,
    locks: KeyedLock,
}

fn entry_key(entry: &AppAllowlistEntry) -> String {
    format!("{}/{}", entry.group_id, entry.app_client_id)
}

fn validate(value: &str, field: &'static str, operation: Operation) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(field, "must not be empty", operation));
    }
    Ok(())
}

impl AllowlistService {
    pub fn new(store: Store, engine: EngineClient) -> Self {
        Self {
            store,
            engine,
            locks: KeyedLock::new(),
        }
    }

    /// Turn an engine failure into the error returned to the caller, after
    /// the compensating write has run.
    fn engine_failure(
        operation: Operation,
        source: EngineError,
        compensation: Result<(), StoreError>,
    ) -> ServiceError {
        match compensation {
            Ok(()) => {
                warn!("Engine failed during {}, store change reverted: {}", operation, source);
                ServiceError::Engine { operation, source }
            }
            Err(compensation_err) => {
                error!(
                    "Engine failed during {} and reverting the store failed, allow-list is inconsistent: engine: {}, store: {}",
                    operation, source, compensation_err
                );
                ServiceError::Internal {
                    operation,
                    message: format!(
                        "compensation failed after engine error ({}): {}",
                        source, compensation_err
                    ),
                }
            }
        }
    }

    /// Allow members of `group_id` to use `app_client_id`
    pub async fn add_allowed_app_to_group(
        &self,
        group_id: &str,
        app_client_id: &str,
    ) -> Result<(), ServiceError> {
        let op = Operation::AddAllowedApp;
        validate(group_id, "group_id", op)?;
        validate(app_client_id, "app_client_id", op)?;
        let entry = AppAllowlistEntry::new(group_id, app_client_id);
        let _guard = self
            .locks
            .lock([group_key(group_id), app_key(app_client_id)])
            .await;

        self.store
            .insert_allowlist_entries(std::slice::from_ref(&entry))
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::AllowlistEntry, entry_key(&entry), op))?;

        if let Err(source) = self.engine.allow_apps(std::slice::from_ref(&entry)).await {
            let compensation = match self.store.delete_allowlist_entry(&entry).await {
                // Already gone, e.g. the group was deleted meanwhile.
                Err(StoreError::NotFound) => Ok(()),
                other => other,
            };
            return Err(Self::engine_failure(op, source, compensation));
        }

        info!("Allowed app {} for group {}", app_client_id, group_id);
        Ok(())
    }

    /// Revoke `app_client_id` from `group_id`
    pub async fn remove_allowed_app_from_group(
        &self,
        group_id: &str,
        app_client_id: &str,
    ) -> Result<(), ServiceError> {
        let op = Operation::RemoveAllowedApp;
        let entry = AppAllowlistEntry::new(group_id, app_client_id);
        let _guard = self
            .locks
            .lock([group_key(group_id), app_key(app_client_id)])
            .await;

        self.store
            .delete_allowlist_entry(&entry)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::AllowlistEntry, entry_key(&entry), op))?;

        if let Err(source) = self.engine.disallow_apps(std::slice::from_ref(&entry)).await {
            let compensation = self
                .store
                .insert_allowlist_entries(std::slice::from_ref(&entry))
                .await;
            return Err(Self::engine_failure(op, source, compensation));
        }

        info!("Removed app {} from group {}", app_client_id, group_id);
        Ok(())
    }

    /// Revoke every application from `group_id`, returning the removed app ids
    pub async fn remove_all_allowed_apps_from_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let op = Operation::RemoveAllAllowedApps;
        let _guard = self.locks.lock([group_key(group_id)]).await;

        let removed = self.revoke_group(op, group_id).await?;
        info!("Removed {} apps from group {}", removed.len(), group_id);
        Ok(removed)
    }

    /// Revoke the group's allow-list and delete the group under one lock.
    ///
    /// Adds for the same group wait on the group key, so none can slip in
    /// between the revoke and the delete and leave an engine tuple behind.
    pub async fn delete_group(&self, group_id: &str) -> Result<(), ServiceError> {
        let op = Operation::DeleteGroup;
        let _guard = self.locks.lock([group_key(group_id)]).await;

        let removed = self.revoke_group(op, group_id).await?;
        self.store
            .delete_group(group_id)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::Group, group_id, op))?;

        info!("Deleted group {} and revoked {} apps", group_id, removed.len());
        Ok(())
    }

    /// Caller must hold the group key
    async fn revoke_group(
        &self,
        operation: Operation,
        group_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let removed = self
            .store
            .delete_allowlist_for_group(group_id)
            .await
            .map_err(|e| {
                ServiceError::from_store(e, Entity::AllowlistEntry, group_id, operation)
            })?;
        self.mirror_bulk_removal(operation, &removed).await?;
        Ok(removed.into_iter().map(|e| e.app_client_id).collect())
    }

    /// Revoke `app_client_id` from every group, returning the affected group ids
    pub async fn remove_all_allowed_groups_for_app(
        &self,
        app_client_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let op = Operation::RemoveAllAllowedGroups;
        let _guard = self.locks.lock([app_key(app_client_id)]).await;

        let removed = self
            .store
            .delete_allowlist_for_app(app_client_id)
            .await
            .map_err(|e| ServiceError::from_store(e, Entity::AllowlistEntry, app_client_id, op))?;
        self.mirror_bulk_removal(op, &removed).await?;

        info!("Removed app {} from {} groups", app_client_id, removed.len());
        Ok(removed.into_iter().map(|e| e.group_id).collect())
    }

    /// Delete `removed` from the engine, restoring it in the store on failure
    async fn mirror_bulk_removal(
        &self,
        operation: Operation,
        removed: &[AppAllowlistEntry],
    ) -> Result<(), ServiceError> {
        if removed.is_empty() {
            return Ok(());
        }
        if let Err(source) = self.engine.disallow_apps(removed).await {
            let compensation = self.store.insert_allowlist_entries(removed).await;
            return Err(Self::engine_failure(operation, source, compensation));
        }
        Ok(())
    }

    pub async fn get_allowed_apps(&self, group_id: &str) -> Result<Vec<String>, ServiceError> {
        self.store.allowed_apps(group_id).await.map_err(|e| {
            ServiceError::from_store(e, Entity::AllowlistEntry, group_id, Operation::GetAllowedApps)
        })
    }

    pub async fn get_allowed_groups_for_app(
        &self,
        app_client_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        self.store.allowed_groups(app_client_id).await.map_err(|e| {
            ServiceError::from_store(
                e,
                Entity::AllowlistEntry,
                app_client_id,
                Operation::GetAllowedGroups,
            )
        })
    }
}
