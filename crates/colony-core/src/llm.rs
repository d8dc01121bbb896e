//! Text-generation capability consumed by every agent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::security::{ApiKey, required_api_key};
use crate::ColonyError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

pub type DynGenerator = Arc<dyn TextGenerator>;

/// Anthropic Messages API client.
pub struct AnthropicGenerator {
    client: reqwest::Client,
    api_key: ApiKey,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ColonyError> {
        let api_key = required_api_key(&config.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                ColonyError::InvalidConfiguration(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    #[tracing::instrument(name = "llm.generate", skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GenerationError::RateLimited);
        }
        let body = response
            .text()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|err| GenerationError::Decode(err.to_string()))?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Closure-backed generator for tests and offline runs.
pub struct FnGenerator<F> {
    respond: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&str) -> Result<String, GenerationError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

#[async_trait]
impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&str) -> Result<String, GenerationError> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (self.respond)(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_generator_passes_prompt_through() {
        let generator = FnGenerator::new(|prompt: &str| Ok(format!("echo: {prompt}")));
        let text = generator.generate("hello").await.unwrap();
        assert_eq!(text, "echo: hello");
    }

    #[tokio::test]
    async fn fn_generator_propagates_failures() {
        let generator = FnGenerator::new(|_: &str| Err(GenerationError::EmptyResponse));
        assert!(matches!(
            generator.generate("x").await,
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn anthropic_generator_requires_key() {
        let config = LlmConfig {
            api_key_env: "COLONY_TEST_UNSET_ANTHROPIC_KEY".into(),
            ..LlmConfig::default()
        };
        let err = AnthropicGenerator::from_config(&config).err().unwrap();
        assert!(matches!(err, ColonyError::MissingSecret(_)));
    }

    #[test]
    fn response_blocks_decode() {
        let body = r#"{"content":[{"type":"text","text":"one"},{"type":"tool_use"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.content.len(), 2);
        assert_eq!(parsed.content[0].text.as_deref(), Some("one"));
    }
}
