pub mod search;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("Search API Error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

/// Source of external, up-to-date context for a prompt.
#[async_trait]
pub trait ContextFetcher: Send + Sync {
    /// Cheap gate deciding whether `message` needs current information.
    fn should_search(&self, message: &str) -> bool;

    /// Retrieved text to append to the prompt. May be empty.
    async fn search(&self, message: &str) -> Result<String, SearchError>;
}
