// Ollama-backed generator: maps roles onto configured models

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{GenerationRequest, Generator, GeneratorResponse, ResponseMetadata};
use crate::config::{LlmConfig, RolesConfig};
use crate::errors::TransportError;
use crate::llm::{ChatRequest, Message, OllamaClient, RetryPolicy};

pub struct OllamaGenerator {
    client: OllamaClient,
    llm: LlmConfig,
    roles: RolesConfig,
}

impl OllamaGenerator {
    pub fn new(llm: LlmConfig, roles: RolesConfig) -> Result<Self, TransportError> {
        let retry = RetryPolicy::new(
            llm.max_retries,
            Duration::from_millis(llm.retry_base_delay_ms),
        );
        let client = OllamaClient::new(&llm.base_url, llm.timeout_secs, retry)?;
        Ok(Self { client, llm, roles })
    }

    fn model_for(&self, request: &GenerationRequest) -> &str {
        self.roles
            .for_role(request.role)
            .model
            .as_deref()
            .unwrap_or(&self.llm.default_model)
    }

    fn to_chat_request(&self, request: &GenerationRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(request.messages.iter().cloned());

        let chat = ChatRequest::new(
            self.model_for(request),
            messages,
            request.sampling,
            self.llm.num_ctx,
        );
        match &request.tools {
            Some(tools) => chat.with_tools(tools),
            None => chat,
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratorResponse, TransportError> {
        let chat = self.to_chat_request(&request);
        let started = Instant::now();

        let response = self.client.chat(&chat).await?;

        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            role = %request.role,
            model = %chat.model,
            latency_ms,
            chars = response.message.content.len(),
            "Generator call completed"
        );

        let tool_uses = response.tool_uses();
        Ok(GeneratorResponse {
            text: response.message.content.trim().to_string(),
            tool_uses,
            metadata: ResponseMetadata {
                generator: "ollama".to_string(),
                model: if response.model.is_empty() {
                    chat.model
                } else {
                    response.model
                },
                input_tokens: response.prompt_eval_count,
                output_tokens: response.eval_count,
                latency_ms: Some(latency_ms),
            },
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
