//! Generation Module - single-shot chat completion against an external LLM
//!
//! The client is instruction-agnostic: callers pick the system instruction
//! (see [`instructions`]) and the client turns every provider failure into a
//! fixed, user-displayable message.

pub mod instructions;
pub mod openai_compat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub use instructions::ClinicalInstruction;
pub use openai_compat::OpenAiCompatibleProvider;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// One chat-completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    /// A system instruction plus one user message, sampled per `config`.
    pub fn new(config: &GenerationConfig, system_instruction: &str, user_payload: &str) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![
                ChatMessage::system(system_instruction),
                ChatMessage::user(user_payload),
            ],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    /// Text of the first completion choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// What the caller renders: generated text, or a sentinel plus its cause.
#[derive(Debug)]
pub enum GenerationResponse {
    Text(String),
    Unavailable {
        sentinel: &'static str,
        cause: GenerationError,
    },
}

impl GenerationResponse {
    /// Text to display. Sentinels are returned as-is.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Unavailable { sentinel, .. } => sentinel,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Unavailable { sentinel, .. } => sentinel.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl From<Result<String, GenerationError>> for GenerationResponse {
    fn from(result: Result<String, GenerationError>) -> Self {
        match result {
            Ok(text) => Self::Text(text),
            Err(cause) => Self::Unavailable {
                sentinel: cause.user_message(),
                cause,
            },
        }
    }
}

/// Sends one instruction + payload to the configured provider. No retries.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Option<Arc<dyn ChatCompletionProvider>>,
    config: GenerationConfig,
}

impl GenerationClient {
    /// Build the default OpenAI-compatible provider when a credential is configured.
    /// Without one the client still works and answers with the credential sentinel.
    pub fn from_config(config: GenerationConfig) -> anyhow::Result<Self> {
        let provider: Option<Arc<dyn ChatCompletionProvider>> = match config.credential() {
            Some(key) => Some(Arc::new(OpenAiCompatibleProvider::new(&config, key.to_string())?)),
            None => {
                tracing::warn!("No generation API key configured; generation will be unavailable");
                None
            }
        };
        Ok(Self { provider, config })
    }

    pub fn with_provider(
        provider: Arc<dyn ChatCompletionProvider>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            provider: Some(provider),
            config,
        }
    }

    pub fn unconfigured(config: GenerationConfig) -> Self {
        Self {
            provider: None,
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Typed variant of [`generate`](Self::generate).
    pub async fn try_generate(
        &self,
        system_instruction: &str,
        user_payload: &str,
    ) -> Result<String, GenerationError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(GenerationError::CredentialMissing)?;

        let request = CompletionRequest::new(&self.config, system_instruction, user_payload);
        let started = Instant::now();
        let text = provider.complete(&request).await?;

        tracing::debug!(
            provider = provider.name(),
            model = %request.model,
            payload_len = user_payload.len(),
            response_len = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation completed"
        );
        Ok(text)
    }

    /// Generated text, or the matching sentinel when anything goes wrong.
    /// The cause is logged, never returned.
    pub async fn respond(
        &self,
        system_instruction: &str,
        user_payload: &str,
    ) -> GenerationResponse {
        let result = self.try_generate(system_instruction, user_payload).await;
        if let Err(e) = &result {
            if e.is_configuration() {
                tracing::warn!(error = %e, "Generation skipped");
            } else {
                tracing::error!(error = %e, "Generation failed");
            }
        }
        GenerationResponse::from(result)
    }

    /// Always returns displayable text; never fails.
    pub async fn generate(&self, system_instruction: &str, user_payload: &str) -> String {
        self.respond(system_instruction, user_payload)
            .await
            .into_text()
    }

    /// Run one of the built-in clinical instructions.
    pub async fn generate_for(
        &self,
        instruction: ClinicalInstruction,
        user_payload: &str,
    ) -> String {
        self.generate(instruction.system_instruction(), user_payload)
            .await
    }
}
