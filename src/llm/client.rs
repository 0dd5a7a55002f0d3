use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ExplorationError;
use crate::llm::prompts::SYSTEM_PROMPT;
use crate::models::LlmOptions;
use crate::providers::LlmClient;

/// Configuration for the Anthropic API client.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from `LLM_API_KEY`).
    pub api_key: String,
    /// Model to use (e.g., "claude-sonnet-4-20250514").
    pub model: String,
}

impl AnthropicConfig {
    pub fn from_env() -> Result<Self, ExplorationError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| ExplorationError::Config("LLM_API_KEY environment variable not set".into()))?;

        Ok(Self {
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
        })
    }

    pub fn new(api_key: String, model: String) -> Self {
        Self { api_key, model }
    }
}

/// Anthropic API client, used as the real `LlmClient` implementation.
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str, options: LlmOptions) -> Result<String, ExplorationError> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: options.max_tokens,
            temperature: Some(options.temperature),
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ExplorationError::LlmParse(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExplorationError::LlmParse(format!(
                "Anthropic API error: {status} - {body}"
            )));
        }

        let response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ExplorationError::LlmParse(format!("invalid response body: {e}")))?;

        response
            .content
            .into_iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text)
            .ok_or_else(|| ExplorationError::LlmParse("no text content in response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}
