// HTTP client for the Ollama chat API

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::retry::{with_retry, RetryPolicy};
use super::types::{Message, SamplingParams, ToolDefinition, ToolUse};
use crate::errors::TransportError;

/// Non-streaming `/api/chat` request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub options: ChatOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OllamaTool>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    pub num_ctx: u32,
}

/// Ollama's function-tool wrapper
#[derive(Debug, Clone, Serialize)]
pub struct OllamaTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDefinition> for OllamaTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: OllamaFunction {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: serde_json::json!({
                    "type": def.input_schema.schema_type,
                    "properties": def.input_schema.properties,
                    "required": def.input_schema.required,
                }),
            },
        }
    }
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, sampling: SamplingParams, num_ctx: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            options: ChatOptions {
                temperature: sampling.temperature,
                num_predict: sampling.max_tokens,
                num_ctx,
            },
            tools: None,
        }
    }

    pub fn with_tools(mut self, tools: &[ToolDefinition]) -> Self {
        if !tools.is_empty() {
            self.tools = Some(tools.iter().map(OllamaTool::from).collect());
        }
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    pub message: ResponseMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseToolCall {
    pub function: ResponseFunction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ChatResponse {
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.message
            .tool_calls
            .iter()
            .map(|call| ToolUse::new(call.function.name.clone(), call.function.arguments.clone()))
            .collect()
    }
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64, retry: RetryPolicy) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TransportError::Unreachable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a chat request with transport-level retry
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        with_retry(self.retry, || self.chat_once(request)).await
    }

    /// Send a single chat request (no retry)
    async fn chat_once(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat request to Ollama"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str::<ChatResponse>(&body)
            .map_err(|e| TransportError::Malformed(format!("{e}: {}", truncate(&body, 200))))
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout_secs)
        } else {
            TransportError::Unreachable(e.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
