use crate::models::{Group, Principal};
use crate::providers::{GroupsProvider, ProviderError};
use crate::store::{Store, StoreBackend};
use async_trait::async_trait;
use log::debug;

/// Reads memberships from the local group directory
pub struct DirectoryProvider {
    store: Store,
}

impl DirectoryProvider {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GroupsProvider for DirectoryProvider {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn fetch_groups(&self, principal: &Principal) -> Result<Vec<Group>, ProviderError> {
        let Some(key) = principal.directory_key() else {
            debug!("{} has no directory key, no local groups", principal);
            return Ok(Vec::new());
        };
        Ok(self.store.groups_for_user(key).await?)
    }
}
