use serde::Deserialize;

/// Configuration for the relationship-based authorization engine
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the engine API (default: http://localhost:8080)
    pub url: String,

    /// Store the relationship tuples live in
    pub store_id: String,

    /// Authorization model to evaluate against; the engine's latest model when empty
    pub model_id: String,

    /// Bearer token sent with every engine request; omitted when empty
    pub api_token: String,

    /// The timeout for engine requests in seconds (default: 5)
    pub query_timeout: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            store_id: String::new(),
            model_id: String::new(),
            api_token: String::new(),
            query_timeout: 5,
        }
    }
}
