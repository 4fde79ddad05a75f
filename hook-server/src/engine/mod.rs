use crate::config::EngineConfig;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// Reexport modules
pub mod batch_check;
pub mod check;
pub mod write;

/// Relation linking a subject to a group it belongs to
pub const MEMBER_RELATION: &str = "member";
/// Relation granting access to an application
pub const CAN_ACCESS_RELATION: &str = "can_access";

pub fn group_object(group_id: &str) -> String {
    format!("group:{}", group_id)
}

pub fn group_members(group_id: &str) -> String {
    format!("group:{}#{}", group_id, MEMBER_RELATION)
}

pub fn application_object(app_client_id: &str) -> String {
    format!("application:{}", app_client_id)
}

/// A single relationship tuple
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(user: impl Into<String>, relation: &str, object: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            relation: relation.to_string(),
            object: object.into(),
        }
    }
}

/// A list of tuples as the engine expects them on the wire
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TupleKeys {
    pub tuple_keys: Vec<TupleKey>,
}

/// Contextual tuples stating that `subject` is a member of every group
fn membership_tuples(subject: &str, group_ids: &[String]) -> TupleKeys {
    TupleKeys {
        tuple_keys: group_ids
            .iter()
            .map(|id| TupleKey::new(subject, MEMBER_RELATION, group_object(id)))
            .collect(),
    }
}

/// Errors that can occur when talking to the authorization engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    Config(String),
    #[error("Failed to send request to engine: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Engine request failed with status: {0}")]
    InvalidStatus(StatusCode),
    #[error("Failed to parse engine response: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Engine could not evaluate check {0}: {1}")]
    CheckFailed(String, String),
}

/// HTTP client for the relationship-based authorization engine
#[derive(Clone)]
pub struct EngineClient {
    client: Client,
    base_url: String,
    store_id: String,
    model_id: Option<String>,
}

impl EngineClient {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| EngineError::Config(format!("invalid engine url: {}", e)))?;

        let mut headers = HeaderMap::new();
        if !config.api_token.is_empty() {
            headers.insert(
                AUTHORIZATION,
                format!("Bearer {}", config.api_token)
                    .parse()
                    .map_err(|_| EngineError::Config("invalid engine api token".to_string()))?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.query_timeout))
            .connect_timeout(Duration::from_secs(2))
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            store_id: config.store_id.clone(),
            model_id: Some(config.model_id.clone()).filter(|id| !id.is_empty()),
        })
    }

    fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Post a JSON body to a store scoped endpoint and return the raw response body
    async fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<Vec<u8>, EngineError> {
        let endpoint = endpoint.strip_prefix("/").unwrap_or(endpoint);
        let url = format!("{}/stores/{}/{}", self.base_url, self.store_id, endpoint);
        debug!("Sending request to engine at: {}", url);

        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::InvalidStatus(status));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Post a JSON body and decode the JSON response
    async fn send_request<R: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, EngineError> {
        let body = self.post(endpoint, body).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Readiness probe against the engine's health endpoint
    pub async fn health_check(&self) -> Result<(), String> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("Engine returned status {}", response.status())),
            Err(err) => Err(format!("Failed to connect to engine: {}", err)),
        }
    }
}
