//! External capabilities consumed by the research strategies.
//!
//! The engine talks to search engines, page fetchers and language models only
//! through these traits. Transport, authentication and provider-side retry are
//! the implementor's business.

pub mod mock;
pub mod throttle;

pub use mock::{ScriptedLlm, StaticFetch, StaticSearch};
pub use throttle::ThrottledSearch;

use crate::error::ProviderError;
use crate::types::{Generation, SearchResult};
use async_trait::async_trait;

/// A web (or corpus) search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a query and return results in ranking order.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError>;
}

/// Fetches a page and returns its readable text.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError>;
}

/// A language model reachable with a system and a user prompt.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<Generation, ProviderError>;

    /// Model name, for logs.
    fn model_name(&self) -> &str {
        "unknown"
    }
}
