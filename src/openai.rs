use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AiModelConfig, CompletionProvider};
use crate::models::ConversationMessage;
use crate::tools::ToolDeclaration;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Failed to reach completion endpoint: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed completion response: {0}")]
    Malformed(String),
}

/// Parameters for one chat-completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ConversationMessage>,
    /// Tools the model may call; empty means a plain reply is required.
    pub tools: Vec<ToolDeclaration>,
}

/// Stateless chat-completion service.
#[async_trait]
pub trait CompletionEndpoint: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, request: CompletionRequest) -> Result<ConversationMessage, CompletionError>;
}

pub fn create_completion_endpoint(config: &AiModelConfig) -> Arc<dyn CompletionEndpoint> {
    match config.provider {
        CompletionProvider::Openai => Arc::new(OpenAiClient::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.api_key.clone(),
            config.temperature,
        )),
    }
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    pub endpoint: String,
    pub model: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ConversationMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ConversationMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiClient {
    pub fn new(endpoint: String, model: String, api_key: String, temperature: Option<f32>) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionEndpoint for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<ConversationMessage, CompletionError> {
        let tools: Vec<serde_json::Value> = request.tools.iter().map(ToolDeclaration::to_wire).collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");
        let body = ChatBody {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
            tools,
            tool_choice,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| CompletionError::Malformed("no choices in response".to_string()))
    }
}
