pub(crate) use crate::config::engine::EngineConfig;
pub(crate) use crate::config::feed::FeedConfig;
pub(crate) use crate::config::store::{StoreConfig, StoreKind};
use config::{Config as ConfigCrate, ConfigError, Environment};
use serde::Deserialize;

pub mod engine;
pub mod feed;
pub mod store;

/// Main configuration structure for the hook server
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// API Key for authentication - required on the hook and admin routes
    pub api_key: String,

    /// The port the server will listen to (default: 8000)
    pub port: u16,

    /// Tenant assigned to groups created through the admin API (default: "default")
    pub tenant: String,

    /// Relational store configuration
    pub store: StoreConfig,

    /// Authorization engine configuration
    pub engine: EngineConfig,

    /// External group feed configuration
    pub feed: FeedConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: "".to_string(),
            port: 8000,
            tenant: "default".to_string(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new Config instance from environment variables
    pub fn new() -> Result<Self, String> {
        Self::from_environment(Self::environment())
    }

    /// `HOOK_` prefixed variables, nested sections separated by `__`
    /// (e.g. `HOOK_ENGINE__STORE_ID`)
    fn environment() -> Environment {
        Environment::with_prefix("HOOK")
            .prefix_separator("_")
            .separator("__")
    }

    fn from_environment(environment: Environment) -> Result<Self, String> {
        ConfigCrate::builder()
            .add_source(environment)
            .build()
            .map_err(|e: ConfigError| e.to_string())?
            .try_deserialize()
            .map_err(|e| e.to_string())
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(
        engine_mock: &wiremock::MockServer,
        feed_mock: &wiremock::MockServer,
    ) -> Self {
        Self {
            api_key: "test_api_key".to_string(),
            port: 0, // Let the OS choose a port
            tenant: "default".to_string(),
            store: StoreConfig {
                backend: StoreKind::InMemory,
                ..Default::default()
            },
            engine: EngineConfig {
                url: engine_mock.uri(),
                store_id: "test-store".to_string(),
                model_id: "test-model".to_string(),
                api_token: "engine-token".to_string(),
                query_timeout: 5,
            },
            feed: FeedConfig {
                enabled: true,
                url: feed_mock.uri(),
                token: "feed-token".to_string(),
                ..Default::default()
            },
        }
    }
}
