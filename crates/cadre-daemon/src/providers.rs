//! Concrete tool providers wired into the executor's `ToolResolver` (§4.8).
//!
//! Fetch goes over the network for real; search and social posting have no
//! configured backend in this deployment, so they degrade to inert stand-ins
//! that log and return empty/ok rather than fail the whole tool-resolution
//! pass.

use async_trait::async_trait;
use cadre_intelligence::tool_resolver::{
    clean_html, FetchProvider, FetchResult, SearchProvider, SearchResult, SocialPoster, ToolError,
};

pub struct HttpFetchProvider {
    client: reqwest::Client,
}

impl HttpFetchProvider {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpFetchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchProvider for HttpFetchProvider {
    async fn fetch(&self, url: &str) -> Result<FetchResult, ToolError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Provider(e.to_string()))?;
        let title = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(url)
            .to_string();
        let body = resp.text().await.map_err(|e| ToolError::Provider(e.to_string()))?;
        Ok(FetchResult { title, content: clean_html(&body) })
    }
}

/// No search backend is configured for this deployment; always returns an
/// empty result set rather than failing the step outright.
pub struct NullSearchProvider;

#[async_trait]
impl SearchProvider for NullSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
        tracing::debug!(query, "web search requested but no provider is configured");
        Ok(Vec::new())
    }
}

/// No social channel is configured for this deployment; logs and no-ops.
pub struct NullSocialPoster;

#[async_trait]
impl SocialPoster for NullSocialPoster {
    async fn post(&self, text: &str) -> Result<(), ToolError> {
        tracing::info!(text, "social post requested but no channel is configured");
        Ok(())
    }
}
