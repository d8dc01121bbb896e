use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{SourceProvider, SourceSnippet, status_error};
use crate::error::ProviderError;
use crate::model::SourceKind;
use crate::security::{ApiKey, optional_api_key};

const OPENALEX_ENDPOINT: &str = "https://api.openalex.org/works";
const SEMANTIC_SCHOLAR_ENDPOINT: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const SEMANTIC_SCHOLAR_FIELDS: &str = "title,abstract,url,authors";
const MAX_AUTHORS: usize = 5;

/// OpenAlex works search; needs no credentials.
pub struct OpenAlexSearch {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl OpenAlexSearch {
    pub fn new(client: reqwest::Client, max_results: usize) -> Self {
        Self {
            client,
            endpoint: OPENALEX_ENDPOINT.to_string(),
            max_results,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct OpenAlexResponse {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Deserialize)]
struct OpenAlexWork {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    authorships: Vec<OpenAlexAuthorship>,
    #[serde(default)]
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default)]
    primary_location: Option<OpenAlexLocation>,
}

#[derive(Deserialize)]
struct OpenAlexAuthorship {
    author: OpenAlexAuthor,
}

#[derive(Deserialize)]
struct OpenAlexAuthor {
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
struct OpenAlexLocation {
    #[serde(default)]
    landing_page_url: Option<String>,
}

/// Rebuild plain text from OpenAlex's word -> positions index.
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |pos| (*pos, word.as_str())))
        .collect();
    positioned.sort_unstable_by_key(|(pos, _)| *pos);
    positioned
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

impl OpenAlexWork {
    fn into_snippet(self) -> SourceSnippet {
        let url = self
            .doi
            .or_else(|| self.primary_location.and_then(|loc| loc.landing_page_url))
            .or(self.id);
        SourceSnippet {
            title: self.display_name.unwrap_or_else(|| "Untitled work".to_string()),
            summary: self
                .abstract_inverted_index
                .as_ref()
                .map(rebuild_abstract)
                .unwrap_or_default(),
            url,
            authors: self
                .authorships
                .into_iter()
                .take(MAX_AUTHORS)
                .map(|a| a.author.display_name)
                .filter(|name| !name.is_empty())
                .collect(),
            kind: SourceKind::Academic,
        }
    }
}

#[async_trait]
impl SourceProvider for OpenAlexSearch {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn search(&self, query: &str) -> Result<Vec<SourceSnippet>, ProviderError> {
        let per_page = self.max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("search", query), ("per-page", per_page.as_str())])
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let body: OpenAlexResponse = response.json().await.map_err(ProviderError::from_reqwest)?;
        Ok(body
            .results
            .into_iter()
            .take(self.max_results)
            .map(OpenAlexWork::into_snippet)
            .collect())
    }
}

/// Semantic Scholar paper search. Works without a key at a lower rate limit.
pub struct SemanticScholarSearch {
    client: reqwest::Client,
    api_key: Option<ApiKey>,
    endpoint: String,
    max_results: usize,
}

impl SemanticScholarSearch {
    pub fn new(client: reqwest::Client, key_env: &str, max_results: usize) -> Self {
        Self {
            client,
            api_key: optional_api_key(key_env),
            endpoint: SEMANTIC_SCHOLAR_ENDPOINT.to_string(),
            max_results,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct ScholarResponse {
    #[serde(default)]
    data: Vec<ScholarPaper>,
}

#[derive(Deserialize)]
struct ScholarPaper {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    summary: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    authors: Vec<ScholarAuthor>,
}

#[derive(Deserialize)]
struct ScholarAuthor {
    #[serde(default)]
    name: String,
}

impl ScholarPaper {
    fn into_snippet(self) -> SourceSnippet {
        SourceSnippet {
            title: self.title.unwrap_or_else(|| "Untitled paper".to_string()),
            summary: self.summary.unwrap_or_default(),
            url: self.url,
            authors: self
                .authors
                .into_iter()
                .take(MAX_AUTHORS)
                .map(|a| a.name)
                .collect(),
            kind: SourceKind::Academic,
        }
    }
}

#[async_trait]
impl SourceProvider for SemanticScholarSearch {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn search(&self, query: &str) -> Result<Vec<SourceSnippet>, ProviderError> {
        let limit = self.max_results.to_string();
        let mut request = self.client.get(&self.endpoint).query(&[
            ("query", query),
            ("limit", limit.as_str()),
            ("fields", SEMANTIC_SCHOLAR_FIELDS),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose());
        }

        let response = request.send().await.map_err(ProviderError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let body: ScholarResponse = response.json().await.map_err(ProviderError::from_reqwest)?;
        Ok(body
            .data
            .into_iter()
            .take(self.max_results)
            .map(ScholarPaper::into_snippet)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstract_is_rebuilt_in_position_order() {
        let mut index = HashMap::new();
        index.insert("electrolytes".to_string(), vec![1]);
        index.insert("Solid".to_string(), vec![0]);
        index.insert("degrade".to_string(), vec![2, 4]);
        index.insert("and".to_string(), vec![3]);
        assert_eq!(
            rebuild_abstract(&index),
            "Solid electrolytes degrade and degrade"
        );
    }

    #[test]
    fn openalex_prefers_doi_then_landing_page() {
        let raw = r#"{"results":[
            {"id":"https://openalex.org/W1","display_name":"A","doi":"https://doi.org/10.1/a",
             "authorships":[{"author":{"display_name":"Ada"}}]},
            {"id":"https://openalex.org/W2","display_name":"B",
             "primary_location":{"landing_page_url":"https://journal.example/b"}},
            {"id":"https://openalex.org/W3"}
        ]}"#;
        let response: OpenAlexResponse = serde_json::from_str(raw).unwrap();
        let snippets: Vec<_> = response
            .results
            .into_iter()
            .map(OpenAlexWork::into_snippet)
            .collect();
        assert_eq!(snippets[0].url.as_deref(), Some("https://doi.org/10.1/a"));
        assert_eq!(snippets[0].authors, vec!["Ada".to_string()]);
        assert_eq!(snippets[1].url.as_deref(), Some("https://journal.example/b"));
        assert_eq!(snippets[2].url.as_deref(), Some("https://openalex.org/W3"));
        assert_eq!(snippets[2].title, "Untitled work");
    }

    #[test]
    fn scholar_papers_decode_with_missing_fields() {
        let raw = r#"{"total":2,"data":[
            {"paperId":"1","title":"Interfaces","abstract":"Dendrites...","url":"https://s2.example/1",
             "authors":[{"authorId":"9","name":"Lin"}]},
            {"paperId":"2","title":null,"abstract":null}
        ]}"#;
        let response: ScholarResponse = serde_json::from_str(raw).unwrap();
        let snippets: Vec<_> = response
            .data
            .into_iter()
            .map(ScholarPaper::into_snippet)
            .collect();
        assert_eq!(snippets[0].summary, "Dendrites...");
        assert_eq!(snippets[0].authors, vec!["Lin".to_string()]);
        assert!(snippets[1].citation().is_none());
        assert_eq!(snippets[1].title, "Untitled paper");
    }
}
