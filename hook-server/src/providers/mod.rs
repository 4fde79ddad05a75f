use crate::models::{Group, Principal};
use crate::store::StoreError;
use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;

pub mod directory;
pub mod feed;

pub use directory::DirectoryProvider;
pub use feed::FeedProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to read local directory: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to send request to feed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Feed request failed with status: {0}")]
    InvalidStatus(StatusCode),
    #[error("Failed to parse feed response: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Feed returned {0} records for a single principal")]
    InvalidTotalSize(usize),
    #[error("Invalid feed configuration: {0}")]
    Config(String),
}

/// A source answering which groups a principal belongs to
#[async_trait]
pub trait GroupsProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn fetch_groups(&self, principal: &Principal) -> Result<Vec<Group>, ProviderError>;
}
