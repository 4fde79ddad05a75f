use super::{StoreBackend, StoreError};
use crate::models::{AppAllowlistEntry, CreateGroup, Group, GroupMembership, UpdateGroup};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    groups: BTreeMap<String, Group>,
    members: BTreeMap<(String, String), GroupMembership>,
    allowlist: BTreeSet<AppAllowlistEntry>,
}

impl Tables {
    fn require_group(&self, group_id: &str) -> Result<&Group, StoreError> {
        self.groups
            .get(group_id)
            .ok_or(StoreError::ForeignKeyViolation)
    }
}

/// Store kept in process memory.
///
/// Enforces the same unique, foreign-key and cascade rules as the SQL
/// schema, and applies each call atomically under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let tables = self.tables.read().await;
        let mut groups: Vec<Group> = tables.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn create_group(&self, input: &CreateGroup) -> Result<Group, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .groups
            .values()
            .any(|g| g.tenant_id == input.tenant_id && g.name == input.name)
        {
            return Err(StoreError::DuplicateKey);
        }

        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: input.name.clone(),
            tenant_id: input.tenant_id.clone(),
            description: input.description.clone(),
            group_type: input.group_type,
            created_at: now,
            updated_at: now,
        };
        tables.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    async fn get_group(&self, group_id: &str) -> Result<Group, StoreError> {
        let tables = self.tables.read().await;
        tables
            .groups
            .get(group_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_group(
        &self,
        group_id: &str,
        input: &UpdateGroup,
    ) -> Result<Group, StoreError> {
        let mut tables = self.tables.write().await;
        let group = tables.groups.get_mut(group_id).ok_or(StoreError::NotFound)?;
        if let Some(description) = &input.description {
            group.description = description.clone();
        }
        group.updated_at = Utc::now();
        Ok(group.clone())
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.groups.remove(group_id).is_none() {
            return Err(StoreError::NotFound);
        }
        tables.members.retain(|(g, _), _| g != group_id);
        tables.allowlist.retain(|e| e.group_id != group_id);
        Ok(())
    }

    async fn add_members(
        &self,
        group_id: &str,
        user_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let tenant_id = tables.require_group(group_id)?.tenant_id.clone();

        let mut seen = HashSet::new();
        for user_id in user_ids {
            let key = (group_id.to_string(), user_id.clone());
            if !seen.insert(user_id) || tables.members.contains_key(&key) {
                return Err(StoreError::DuplicateKey);
            }
        }

        let now = Utc::now();
        for user_id in user_ids {
            tables.members.insert(
                (group_id.to_string(), user_id.clone()),
                GroupMembership {
                    group_id: group_id.to_string(),
                    user_id: user_id.clone(),
                    tenant_id: tenant_id.clone(),
                    role: role.to_string(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn remove_members(&self, group_id: &str, user_ids: &[String]) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut removed = 0;
        for user_id in user_ids {
            if tables
                .members
                .remove(&(group_id.to_string(), user_id.clone()))
                .is_some()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError> {
        let tables = self.tables.read().await;
        let mut groups: Vec<Group> = tables
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| tables.groups.get(&m.group_id).cloned())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn memberships_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_user_memberships_except(
        &self,
        user_id: &str,
        keep: &[String],
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.members.len();
        tables
            .members
            .retain(|(g, u), _| u != user_id || keep.contains(g));
        Ok((before - tables.members.len()) as u64)
    }

    async fn upsert_user_memberships(
        &self,
        user_id: &str,
        group_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let mut seen = HashSet::new();
        for group_id in group_ids {
            tables.require_group(group_id)?;
            if !seen.insert(group_id) {
                return Err(StoreError::Backend(format!(
                    "upsert would affect membership ({}, {}) twice",
                    group_id, user_id
                )));
            }
        }

        let now = Utc::now();
        for group_id in group_ids {
            let tenant_id = tables.require_group(group_id)?.tenant_id.clone();
            tables
                .members
                .entry((group_id.clone(), user_id.to_string()))
                .and_modify(|m| m.updated_at = now)
                .or_insert_with(|| GroupMembership {
                    group_id: group_id.clone(),
                    user_id: user_id.to_string(),
                    tenant_id,
                    role: role.to_string(),
                    created_at: now,
                    updated_at: now,
                });
        }
        Ok(())
    }

    async fn insert_allowlist_entries(
        &self,
        entries: &[AppAllowlistEntry],
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let mut seen = HashSet::new();
        for entry in entries {
            tables.require_group(&entry.group_id)?;
            if !seen.insert(entry) || tables.allowlist.contains(entry) {
                return Err(StoreError::DuplicateKey);
            }
        }

        tables.allowlist.extend(entries.iter().cloned());
        Ok(())
    }

    async fn delete_allowlist_entry(&self, entry: &AppAllowlistEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.allowlist.remove(entry) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn delete_allowlist_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError> {
        let mut tables = self.tables.write().await;
        let (removed, kept): (BTreeSet<_>, BTreeSet<_>) = std::mem::take(&mut tables.allowlist)
            .into_iter()
            .partition(|e| e.group_id == group_id);
        tables.allowlist = kept;
        Ok(removed.into_iter().collect())
    }

    async fn delete_allowlist_for_app(
        &self,
        app_client_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError> {
        let mut tables = self.tables.write().await;
        let (removed, kept): (BTreeSet<_>, BTreeSet<_>) = std::mem::take(&mut tables.allowlist)
            .into_iter()
            .partition(|e| e.app_client_id == app_client_id);
        tables.allowlist = kept;
        Ok(removed.into_iter().collect())
    }

    async fn allowed_apps(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .allowlist
            .iter()
            .filter(|e| e.group_id == group_id)
            .map(|e| e.app_client_id.clone())
            .collect())
    }

    async fn allowed_groups(&self, app_client_id: &str) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        let mut groups: Vec<String> = tables
            .allowlist
            .iter()
            .filter(|e| e.app_client_id == app_client_id)
            .map(|e| e.group_id.clone())
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}
