use crate::config::AppConfig;
use crate::engine::EngineClient;
use crate::providers::{DirectoryProvider, FeedProvider, GroupsProvider};
use crate::services::{AllowlistService, GroupDirectory, TokenHookPipeline};
use crate::store::{create_store, Store, StoreBackend};
use log::info;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub engine: EngineClient,
    pub directory: GroupDirectory,
    pub allowlist: AllowlistService,
    pub pipeline: TokenHookPipeline,
}

impl AppState {
    /// Connect to the configured store and build every service on top of it
    pub async fn new(config: AppConfig) -> Result<Self, std::io::Error> {
        let store = create_store(&config).await.map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to create store: {}", e),
            )
        })?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: Store) -> Result<Self, std::io::Error> {
        let engine = EngineClient::new(&config.engine).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Failed to create engine client: {}", e),
            )
        })?;

        let mut providers: Vec<Arc<dyn GroupsProvider>> =
            vec![Arc::new(DirectoryProvider::new(store.clone()))];
        if config.feed.enabled {
            let feed = FeedProvider::new(&config.feed, config.tenant.clone()).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Failed to create feed provider: {}", e),
                )
            })?;
            providers.push(Arc::new(feed));
        }
        info!(
            "Group providers: {}",
            providers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            directory: GroupDirectory::new(store.clone(), config.tenant.clone()),
            allowlist: AllowlistService::new(store.clone(), engine.clone()),
            pipeline: TokenHookPipeline::new(providers, engine.clone()),
            config: Arc::new(config),
            store,
            engine,
        })
    }

    #[cfg(test)]
    pub fn for_testing(config: &AppConfig) -> Self {
        use crate::store::memory::InMemoryStore;

        Self::with_store(config.clone(), Store::InMemory(InMemoryStore::new()))
            .expect("Failed to create test state")
    }

    /// Readiness of the store and the engine
    pub async fn health_check(&self) -> (Result<(), String>, Result<(), String>) {
        tokio::join!(self.store.health_check(), self.engine.health_check())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreKind;

    #[tokio::test]
    async fn test_for_testing_uses_in_memory_store() {
        let engine_mock = wiremock::MockServer::start().await;
        let feed_mock = wiremock::MockServer::start().await;
        let config = AppConfig::for_test_with_mocks(&engine_mock, &feed_mock);

        let state = AppState::for_testing(&config);
        assert_eq!(state.config.store.backend, StoreKind::InMemory);
        assert!(state.store.health_check().await.is_ok());
    }

    #[test]
    fn test_invalid_engine_url_fails() {
        let mut config = AppConfig::default();
        config.engine.url = "::not a url::".to_string();
        let result = AppState::with_store(
            config,
            Store::InMemory(crate::store::memory::InMemoryStore::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_state_clone_shares_config() {
        let state = AppState::with_store(
            AppConfig::default(),
            Store::InMemory(crate::store::memory::InMemoryStore::new()),
        )
        .unwrap();
        let cloned = state.clone();
        assert_eq!(Arc::as_ptr(&state.config), Arc::as_ptr(&cloned.config));
    }
}
