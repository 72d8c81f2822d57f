//! Chat-completion client.
//!
//! [`ChatModel`] is the seam between the conversation agent and the hosted
//! LLM. [`OpenAIChatModel`] speaks the OpenAI-compatible
//! `POST /chat/completions` protocol, which most hosted providers accept.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{ApiError, GenerationError};
use crate::retry::{api_key_from_env, post_json_with_retry, RetryPolicy};

const SERVICE: &str = "chat completion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A remote (or stub) chat-completion service.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate the assistant reply for `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completion API.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAIChatModel {
    /// The API key is resolved from `llm.api_key_env` on each request.
    pub fn new(config: &LlmConfig) -> Result<Self, ApiError> {
        Self::build(config, None)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self, ApiError> {
        Self::build(config, Some(api_key))
    }

    fn build(config: &LlmConfig, api_key: Option<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport {
                service: SERVICE,
                source: e,
            })?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        tracing::info!(endpoint = %endpoint, model = %config.model, "chat model configured");

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            retry: config.retry.clone(),
        })
    }

    fn api_key(&self) -> Result<String, ApiError> {
        match &self.api_key {
            Some(key) => Ok(key.clone()),
            None => api_key_from_env(&self.api_key_env),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let body = serde_json::to_value(&request).map_err(|e| ApiError::InvalidResponse {
            service: SERVICE,
            reason: format!("could not encode request: {}", e),
        })?;

        let api_key = self.api_key()?;
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            Some(&api_key),
            &body,
            &self.retry,
            SERVICE,
        )
        .await?;

        parse_chat_response(json)
    }
}

fn parse_chat_response(json: serde_json::Value) -> Result<String, GenerationError> {
    let response: ChatResponse =
        serde_json::from_value(json).map_err(|e| ApiError::InvalidResponse {
            service: SERVICE,
            reason: e.to_string(),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(GenerationError::EmptyResponse)
}

pub fn create_chat_model(config: &LlmConfig) -> anyhow::Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChatModel::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
