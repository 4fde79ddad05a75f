use serde::Deserialize;

/// Configuration for the external group feed
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    /// Register the feed as a group provider (default: false)
    pub enabled: bool,

    /// Base URL of the feed API
    pub url: String,

    /// Bearer token for the feed API
    pub token: String,

    /// API version segment of the query path (default: v59.0)
    pub api_version: String,

    /// Object holding one record per employee (default: Employee)
    pub object: String,

    /// The timeout for feed queries in seconds (default: 5)
    pub query_timeout: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            token: String::new(),
            api_version: "v59.0".to_string(),
            object: "Employee".to_string(),
            query_timeout: 5,
        }
    }
}
