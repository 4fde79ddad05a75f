use crate::config::FeedConfig;
use crate::models::{Group, GroupType, Principal};
use crate::providers::{GroupsProvider, ProviderError};
use async_trait::async_trait;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Prefix of the ids given to groups reported by the feed
pub const EXTERNAL_ID_PREFIX: &str = "external:";

#[derive(Debug, Deserialize, Clone, PartialEq)]
struct QueryResponse {
    #[serde(rename = "totalSize")]
    total_size: usize,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    records: Vec<EmployeeRecord>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
struct EmployeeRecord {
    #[serde(rename = "Department", default)]
    department: Option<String>,
    #[serde(rename = "Team", default)]
    team: Option<String>,
}

/// Escape a value for use inside a single quoted query literal
fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Queries an external employee feed keyed by email
pub struct FeedProvider {
    client: Client,
    query_url: Url,
    object: String,
    tenant: String,
}

impl FeedProvider {
    pub fn new(config: &FeedConfig, tenant: impl Into<String>) -> Result<Self, ProviderError> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| ProviderError::Config(format!("invalid feed url: {}", e)))?;
        // Without a trailing slash `join` would replace the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base
            .join(&format!("services/data/{}/query", config.api_version))
            .map_err(|e| ProviderError::Config(format!("invalid feed api version: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| ProviderError::Config("invalid feed token".to_string()))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.query_timeout))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            query_url,
            object: config.object.clone(),
            tenant: tenant.into(),
        })
    }

    fn query_for(&self, email: &str) -> String {
        format!(
            "SELECT Department, Team FROM {} WHERE Email = '{}'",
            self.object,
            escape_literal(email)
        )
    }

    fn to_group(&self, name: &str) -> Group {
        let now = Utc::now();
        Group {
            id: format!("{}{}", EXTERNAL_ID_PREFIX, name),
            name: name.to_string(),
            tenant_id: self.tenant.clone(),
            description: String::new(),
            group_type: GroupType::External,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl GroupsProvider for FeedProvider {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn fetch_groups(&self, principal: &Principal) -> Result<Vec<Group>, ProviderError> {
        let Some(email) = principal.email() else {
            return Ok(Vec::new());
        };

        let mut url = self.query_url.clone();
        url.query_pairs_mut().append_pair("q", &self.query_for(email));
        debug!("Querying feed for {}", principal);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::InvalidStatus(response.status()));
        }
        let body = response.bytes().await?;
        let result: QueryResponse = serde_json::from_slice(&body)?;

        let count = result.total_size.max(result.records.len());
        if count > 1 {
            warn!("Feed returned {} records for {}", count, principal);
            return Err(ProviderError::InvalidTotalSize(count));
        }
        if !result.done {
            debug!("Feed reported an incomplete result for {}", principal);
        }

        let Some(record) = result.records.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut groups: Vec<Group> = Vec::new();
        for value in [record.department, record.team].into_iter().flatten() {
            let value = value.trim();
            if !value.is_empty() && !groups.iter().any(|g| g.name == value) {
                groups.push(self.to_group(value));
            }
        }
        Ok(groups)
    }
}
