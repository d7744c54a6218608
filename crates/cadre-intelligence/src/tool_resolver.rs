//! Tool-use resolver (§4.8). Model output is treated as an untrusted
//! mini-language: markers are found with an explicit regex, capped per
//! call, and stripped from the final persisted answer.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

pub const MAX_FETCHES_PER_CALL: usize = 3;
const MAX_FETCH_BYTES: usize = 8_000;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub title: String,
    pub content: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError>;
}

#[async_trait]
pub trait FetchProvider: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResult, ToolError>;
}

#[async_trait]
pub trait SocialPoster: Send + Sync {
    async fn post(&self, text: &str) -> Result<(), ToolError>;
}

fn web_search_re() -> Regex {
    Regex::new(r"\[WEB_SEARCH:([^\]]+)\]").unwrap()
}
fn web_fetch_re() -> Regex {
    Regex::new(r"\[WEB_FETCH:([^\]]+)\]").unwrap()
}
fn social_post_re() -> Regex {
    Regex::new(r"\[SOCIAL_POST:([^\]]+)\]").unwrap()
}

/// Strips HTML scripts/styles, collapses entities and whitespace, and
/// truncates to the byte cap — a crude but dependency-free approximation
/// of the documented fetch-cleanup pipeline.
pub fn clean_html(raw: &str) -> String {
    let without_scripts = Regex::new(r"(?is)<script.*?</script>").unwrap().replace_all(raw, "");
    let without_styles = Regex::new(r"(?is)<style.*?</style>").unwrap().replace_all(&without_scripts, "");
    let without_tags = Regex::new(r"(?s)<[^>]+>").unwrap().replace_all(&without_styles, " ");
    let entities_decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");
    let collapsed = Regex::new(r"\s+").unwrap().replace_all(&entities_decoded, " ");
    let trimmed = collapsed.trim();
    if trimmed.len() > MAX_FETCH_BYTES {
        trimmed[..MAX_FETCH_BYTES].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extracts up to three URLs present in a task description for eager
/// pre-fetching (§4.8 "Pre-fetch").
pub fn extract_urls(text: &str, limit: usize) -> Vec<String> {
    let url_re = Regex::new(r"https?://[^\s\]\)]+").unwrap();
    url_re
        .find_iter(text)
        .take(limit)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub struct ToolResolver {
    pub search: Arc<dyn SearchProvider>,
    pub fetch: Arc<dyn FetchProvider>,
    pub social: Arc<dyn SocialPoster>,
}

pub struct ResolvedTools {
    pub had_web_markers: bool,
    pub web_data_block: String,
}

impl ToolResolver {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetch: Arc<dyn FetchProvider>,
        social: Arc<dyn SocialPoster>,
    ) -> Self {
        Self { search, fetch, social }
    }

    /// Pre-fetches any URLs embedded in a task description, eagerly, before
    /// the first model call.
    pub async fn prefetch_appendix(&self, task_description: &str) -> String {
        let urls = extract_urls(task_description, MAX_FETCHES_PER_CALL);
        if urls.is_empty() {
            return String::new();
        }
        let mut appendix = String::from("\n\n## PRE-FETCHED URL CONTENT\n");
        for url in urls {
            match self.fetch.fetch(&url).await {
                Ok(result) => {
                    appendix.push_str(&format!("### {} ({})\n{}\n\n", result.title, url, result.content));
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "prefetch failed");
                }
            }
        }
        appendix
    }

    /// Scans model output for tool-use markers, executes them (capped at
    /// `MAX_FETCHES_PER_CALL` fetches), and returns a "LIVE WEB DATA" block
    /// to feed back into a follow-up model call if any `[WEB_*]` marker
    /// was found. `[SOCIAL_POST:...]` is fire-and-forget and does not
    /// trigger a follow-up call.
    pub async fn resolve(&self, content: &str) -> ResolvedTools {
        let mut web_data = String::new();
        let mut had_web_markers = false;

        for cap in web_search_re().captures_iter(content) {
            had_web_markers = true;
            let query = cap[1].trim();
            match self.search.search(query).await {
                Ok(results) => {
                    web_data.push_str(&format!("### Search: {query}\n"));
                    for r in results {
                        web_data.push_str(&format!("- {} ({}) — {}\n", r.title, r.url, r.snippet));
                    }
                }
                Err(e) => tracing::warn!(query, error = %e, "web search failed"),
            }
        }

        let fetch_urls: Vec<String> = web_fetch_re()
            .captures_iter(content)
            .take(MAX_FETCHES_PER_CALL)
            .map(|c| c[1].trim().to_string())
            .collect();
        for url in fetch_urls {
            had_web_markers = true;
            match self.fetch.fetch(&url).await {
                Ok(result) => {
                    web_data.push_str(&format!("### Fetch: {} ({url})\n{}\n\n", result.title, result.content));
                }
                Err(e) => tracing::warn!(url, error = %e, "web fetch failed"),
            }
        }

        for cap in social_post_re().captures_iter(content) {
            let text = cap[1].trim().to_string();
            if let Err(e) = self.social.post(&text).await {
                tracing::warn!(error = %e, "social post failed");
            }
        }

        ResolvedTools {
            had_web_markers,
            web_data_block: web_data,
        }
    }

    /// Builds the follow-up user message when `[WEB_*]` markers triggered a
    /// re-invocation at the same tier.
    pub fn build_followup_message(task_description: &str, web_data_block: &str) -> String {
        format!(
            "{task_description}\n\n## LIVE WEB DATA\n{web_data_block}\nUse the data above. Do not emit any further [WEB_SEARCH:], [WEB_FETCH:], or [SOCIAL_POST:] markers in your response."
        )
    }

    /// Strips any remaining markers before the answer is persisted.
    pub fn strip_markers(content: &str) -> String {
        let stripped = web_search_re().replace_all(content, "");
        let stripped = web_fetch_re().replace_all(&stripped, "");
        social_post_re().replace_all(&stripped, "").into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSearch;
    #[async_trait]
    impl SearchProvider for StubSearch {
        async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
            Ok(vec![SearchResult {
                title: format!("Result for {query}"),
                url: "https://example.com".into(),
                snippet: "snippet".into(),
            }])
        }
    }

    struct StubFetch;
    #[async_trait]
    impl FetchProvider for StubFetch {
        async fn fetch(&self, url: &str) -> Result<FetchResult, ToolError> {
            Ok(FetchResult {
                title: "Example".into(),
                content: format!("content of {url}"),
            })
        }
    }

    struct StubSocial;
    #[async_trait]
    impl SocialPoster for StubSocial {
        async fn post(&self, _text: &str) -> Result<(), ToolError> {
            Ok(())
        }
    }

    fn resolver() -> ToolResolver {
        ToolResolver::new(Arc::new(StubSearch), Arc::new(StubFetch), Arc::new(StubSocial))
    }

    #[tokio::test]
    async fn resolve_detects_web_markers_and_populates_block() {
        let r = resolver();
        let resolved = r.resolve("before [WEB_SEARCH:rust async] after").await;
        assert!(resolved.had_web_markers);
        assert!(resolved.web_data_block.contains("Result for rust async"));
    }

    #[tokio::test]
    async fn resolve_caps_fetches_at_three() {
        let r = resolver();
        let content = "[WEB_FETCH:https://a.com] [WEB_FETCH:https://b.com] [WEB_FETCH:https://c.com] [WEB_FETCH:https://d.com]";
        let resolved = r.resolve(content).await;
        let fetch_count = resolved.web_data_block.matches("### Fetch:").count();
        assert_eq!(fetch_count, MAX_FETCHES_PER_CALL);
    }

    #[test]
    fn strip_markers_removes_all_three_forms() {
        let content = "see [WEB_SEARCH:x] and [WEB_FETCH:https://y.com] then [SOCIAL_POST:hi]";
        let stripped = ToolResolver::strip_markers(content);
        assert!(!stripped.contains("WEB_SEARCH"));
        assert!(!stripped.contains("WEB_FETCH"));
        assert!(!stripped.contains("SOCIAL_POST"));
    }

    #[test]
    fn extract_urls_respects_limit() {
        let text = "see https://a.com and https://b.com and https://c.com and https://d.com";
        let urls = extract_urls(text, 3);
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn clean_html_strips_scripts_and_collapses_whitespace() {
        let html = "<html><script>evil()</script><body>Hello   <b>World</b></body></html>";
        let cleaned = clean_html(html);
        assert!(!cleaned.contains("evil"));
        assert!(cleaned.contains("Hello World"));
    }
}
