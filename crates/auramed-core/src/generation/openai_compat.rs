//! OpenAI-compatible `/chat/completions` provider (Groq, OpenAI, Ollama, ...)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ChatCompletionProvider, CompletionRequest};
use crate::config::GenerationConfig;
use crate::error::GenerationError;

pub struct OpenAiCompatibleProvider {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            timeout_secs = config.timeout_secs,
            "Creating OpenAI-compatible provider"
        );

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout {
                endpoint: self.endpoint.clone(),
            }
        } else {
            GenerationError::Transport {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            }
        }
    }

    /// Parse a body as JSON, reporting HTML error pages (gateways, CDNs) as malformed.
    fn parse_body<T: serde::de::DeserializeOwned>(&self, body: &str) -> Result<T, GenerationError> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(GenerationError::MalformedResponse {
                endpoint: self.endpoint.clone(),
                message: format!("HTML instead of JSON: {}", preview),
            });
        }

        serde_json::from_str::<T>(body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            GenerationError::MalformedResponse {
                endpoint: self.endpoint.clone(),
                message: format!("{}. Response body: {}", e, preview),
            }
        })
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            max_tokens = request.max_tokens,
            "Sending chat completion request"
        );

        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let preview: String = text.chars().take(300).collect();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        let parsed: ChatCompletionResponse = self.parse_body(&text)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyCompletion)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}
