//! External knowledge sources.
//!
//! Providers only report what happened; [`ResilientSource`] applies one
//! declarative [`ProviderPolicy`] (timeout, rate-limit retries, fallback) and
//! turns every failure into "no results".

mod academic;
mod fetch;
mod web;

pub use academic::{OpenAlexSearch, SemanticScholarSearch};
pub use fetch::{FetchFailure, HttpPageFetcher, PageFetcher, strip_markup};
pub use web::BraveWebSearch;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::metrics;
use crate::model::{Citation, SourceKind};

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnippet {
    pub title: String,
    /// Description for web hits, abstract for papers.
    pub summary: String,
    pub url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub kind: SourceKind,
}

impl SourceSnippet {
    /// Snippets without a usable URL cannot be cited.
    pub fn citation(&self) -> Option<Citation> {
        let url = self.url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(Citation {
            title: self.title.clone(),
            url: url.to_string(),
            kind: self.kind,
        })
    }
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SourceSnippet>, ProviderError>;
}

pub type DynSourceProvider = Arc<dyn SourceProvider>;

#[derive(Debug, Clone, Copy)]
pub struct ProviderPolicy {
    pub timeout: Duration,
    /// Extra attempts granted when the provider answers "rate limited".
    pub rate_limit_retries: u32,
    pub retry_delay: Duration,
}

impl ProviderPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            rate_limit_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_rate_limit_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.rate_limit_retries = retries;
        self.retry_delay = delay;
        self
    }
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

struct SourceLink {
    provider: DynSourceProvider,
    policy: ProviderPolicy,
}

/// A provider chain: each link is consulted only when every earlier link came
/// back empty or failed.
pub struct ResilientSource {
    links: Vec<SourceLink>,
}

impl ResilientSource {
    pub fn new(provider: DynSourceProvider, policy: ProviderPolicy) -> Self {
        Self {
            links: vec![SourceLink { provider, policy }],
        }
    }

    /// A chain with no providers; every search comes back empty.
    pub fn disabled() -> Self {
        Self { links: Vec::new() }
    }

    pub fn with_fallback(mut self, provider: DynSourceProvider, policy: ProviderPolicy) -> Self {
        self.links.push(SourceLink { provider, policy });
        self
    }

    /// Never fails; an unavailable chain yields an empty list.
    pub async fn search(&self, query: &str) -> Vec<SourceSnippet> {
        for (position, link) in self.links.iter().enumerate() {
            let results = attempt(link, query).await;
            if !results.is_empty() {
                return results;
            }
            if position + 1 < self.links.len() {
                debug!(
                    provider = link.provider.name(),
                    "no results from provider, consulting fallback"
                );
            }
        }
        Vec::new()
    }
}

async fn attempt(link: &SourceLink, query: &str) -> Vec<SourceSnippet> {
    let name = link.provider.name();
    let mut retries_left = link.policy.rate_limit_retries;

    loop {
        let outcome = match timeout(link.policy.timeout, link.provider.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        match outcome {
            Ok(results) => {
                debug!(provider = name, count = results.len(), "provider answered");
                return results;
            }
            Err(ProviderError::RateLimited) if retries_left > 0 => {
                retries_left -= 1;
                warn!(
                    provider = name,
                    delay_ms = link.policy.retry_delay.as_millis() as u64,
                    "provider rate limited, retrying once after delay"
                );
                metrics::record_provider_failure(name, ProviderError::RateLimited.class());
                sleep(link.policy.retry_delay).await;
            }
            Err(err @ ProviderError::MissingCredentials(_)) => {
                debug!(provider = name, error = %err, "provider skipped");
                return Vec::new();
            }
            Err(err) => {
                warn!(provider = name, error = %err, "provider unavailable, continuing without it");
                metrics::record_provider_failure(name, err.class());
                return Vec::new();
            }
        }
    }
}

/// Map an HTTP status to a provider error. 429 is the only rate-limit signal.
pub(crate) fn status_error(status: reqwest::StatusCode) -> ProviderError {
    if status.as_u16() == 429 {
        ProviderError::RateLimited
    } else {
        ProviderError::Status(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<Vec<SourceSnippet>, ProviderError>>>,
    }

    impl Scripted {
        fn new(
            name: &'static str,
            responses: Vec<Result<Vec<SourceSnippet>, ProviderError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str) -> Result<Vec<SourceSnippet>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            }
        }
    }

    fn paper(title: &str) -> SourceSnippet {
        SourceSnippet {
            title: title.into(),
            summary: "abstract".into(),
            url: Some(format!("https://papers.example/{title}")),
            authors: vec![],
            kind: SourceKind::Academic,
        }
    }

    fn quick() -> ProviderPolicy {
        ProviderPolicy::new(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn primary_results_skip_fallback() {
        let primary = Scripted::new("primary", vec![Ok(vec![paper("a")])]);
        let fallback = Scripted::new("fallback", vec![Ok(vec![paper("b")])]);
        let source = ResilientSource::new(primary.clone(), quick()).with_fallback(fallback.clone(), quick());

        let results = source.search("q").await;
        assert_eq!(results, vec![paper("a")]);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn empty_primary_consults_fallback() {
        let primary = Scripted::new("primary", vec![Ok(vec![])]);
        let fallback = Scripted::new("fallback", vec![Ok(vec![paper("b")])]);
        let source = ResilientSource::new(primary, quick()).with_fallback(fallback.clone(), quick());

        assert_eq!(source.search("q").await, vec![paper("b")]);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn failing_primary_consults_fallback() {
        let primary = Scripted::new("primary", vec![Err(ProviderError::Status(503))]);
        let fallback = Scripted::new("fallback", vec![Ok(vec![paper("b")])]);
        let source = ResilientSource::new(primary, quick()).with_fallback(fallback, quick());

        assert_eq!(source.search("q").await.len(), 1);
    }

    #[tokio::test]
    async fn rate_limited_fallback_is_retried_exactly_once() {
        let primary = Scripted::new("primary", vec![Ok(vec![])]);
        let fallback = Scripted::new(
            "fallback",
            vec![
                Err(ProviderError::RateLimited),
                Err(ProviderError::RateLimited),
                Ok(vec![paper("late")]),
            ],
        );
        let policy = quick().with_rate_limit_retry(1, Duration::from_millis(5));
        let source = ResilientSource::new(primary, quick()).with_fallback(fallback.clone(), policy);

        assert!(source.search("q").await.is_empty());
        assert_eq!(fallback.calls(), 2);
    }

    #[tokio::test]
    async fn retry_result_is_accepted() {
        let fallback = Scripted::new(
            "fallback",
            vec![Err(ProviderError::RateLimited), Ok(vec![paper("ok")])],
        );
        let policy = quick().with_rate_limit_retry(1, Duration::from_millis(5));
        let source = ResilientSource::new(fallback.clone(), policy);

        assert_eq!(source.search("q").await, vec![paper("ok")]);
        assert_eq!(fallback.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_without_retry_policy_is_unavailable() {
        let primary = Scripted::new("primary", vec![Err(ProviderError::RateLimited)]);
        let source = ResilientSource::new(primary.clone(), quick());

        assert!(source.search("q").await.is_empty());
        assert_eq!(primary.calls(), 1);
    }

    struct Hanging;

    #[async_trait]
    impl SourceProvider for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SourceSnippet>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![paper("never")])
        }
    }

    #[tokio::test]
    async fn slow_provider_is_cut_off_by_policy_timeout() {
        let source = ResilientSource::new(
            Arc::new(Hanging),
            ProviderPolicy::new(Duration::from_millis(20)),
        );
        assert!(source.search("q").await.is_empty());
    }

    #[test]
    fn snippets_without_url_are_not_citable() {
        let mut snippet = paper("x");
        assert!(snippet.citation().is_some());
        snippet.url = Some("   ".into());
        assert!(snippet.citation().is_none());
        snippet.url = None;
        assert!(snippet.citation().is_none());
    }
}
