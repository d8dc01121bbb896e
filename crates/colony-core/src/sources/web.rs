use async_trait::async_trait;
use serde::Deserialize;

use super::{SourceProvider, SourceSnippet, status_error};
use crate::error::ProviderError;
use crate::model::SourceKind;
use crate::security::{ApiKey, optional_api_key};

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave Search web results. Without an API key every search is skipped.
pub struct BraveWebSearch {
    client: reqwest::Client,
    api_key: Option<ApiKey>,
    key_env: String,
    endpoint: String,
    max_results: usize,
}

impl BraveWebSearch {
    pub fn new(client: reqwest::Client, key_env: &str, max_results: usize) -> Self {
        Self {
            client,
            api_key: optional_api_key(key_env),
            key_env: key_env.to_string(),
            endpoint: BRAVE_ENDPOINT.to_string(),
            max_results,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize, Default)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: Option<String>,
}

fn into_snippets(response: BraveResponse, limit: usize) -> Vec<SourceSnippet> {
    response
        .web
        .unwrap_or_default()
        .results
        .into_iter()
        .take(limit)
        .map(|hit| SourceSnippet {
            title: hit.title,
            summary: hit.description,
            url: hit.url,
            authors: Vec::new(),
            kind: SourceKind::Web,
        })
        .collect()
}

#[async_trait]
impl SourceProvider for BraveWebSearch {
    fn name(&self) -> &str {
        "brave_web"
    }

    async fn search(&self, query: &str) -> Result<Vec<SourceSnippet>, ProviderError> {
        let Some(key) = &self.api_key else {
            return Err(ProviderError::MissingCredentials(self.key_env.clone()));
        };

        let count = self.max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key.expose())
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let body: BraveResponse = response.json().await.map_err(ProviderError::from_reqwest)?;
        Ok(into_snippets(body, self.max_results))
    }
}
