use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::config::GenerationConfig;
use crate::core::error::{AppError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
}

/// Outbound request to the text-generation collaborator. The system
/// instruction travels only in this struct's `system` field and is never
/// logged alongside it.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Boundary to the external text-generation API.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput>;
}

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    model: String,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: i64,
    output_tokens: i64,
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: &request.messages,
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("Text generation request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "Text generation API returned {}",
                status
            )));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Invalid text generation response: {}", e))
        })?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerationOutput {
            text,
            model: parsed.model,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}
