// Unified generator interface for every pipeline role

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::TransportError;
use crate::llm::{Message, SamplingParams, ToolDefinition, ToolUse};

pub mod ollama;

pub use ollama::OllamaGenerator;

/// The role a generator call is made on behalf of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Drafter,
    Reviser,
    Critic,
    GrammarEditor,
    StyleEditor,
    ContinuityEditor,
    Summarizer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Drafter => "drafter",
            AgentRole::Reviser => "reviser",
            AgentRole::Critic => "critic",
            AgentRole::GrammarEditor => "grammar_editor",
            AgentRole::StyleEditor => "style_editor",
            AgentRole::ContinuityEditor => "continuity_editor",
            AgentRole::Summarizer => "summarizer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generator invocation: single prompt or multi-turn
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub role: AgentRole,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub sampling: SamplingParams,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl GenerationRequest {
    /// Single-prompt request
    pub fn prompt(role: AgentRole, prompt: impl Into<String>) -> Self {
        Self::conversation(role, vec![Message::user(prompt)])
    }

    /// Multi-turn request
    pub fn conversation(role: AgentRole, messages: Vec<Message>) -> Self {
        Self {
            role,
            system: None,
            messages,
            sampling: SamplingParams::default(),
            tools: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// The last user message, which carries the task for single-prompt calls
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub generator: String,
    pub model: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub latency_ms: Option<u64>,
}

/// Unified response format
#[derive(Debug, Clone)]
pub struct GeneratorResponse {
    /// Primary text response
    pub text: String,

    /// Tool uses requested by the generator
    pub tool_uses: Vec<ToolUse>,

    pub metadata: ResponseMetadata,
}

impl GeneratorResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_uses: Vec::new(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Blocking request/response language-model call.
///
/// Implementations own transport concerns (timeouts, retries, model
/// selection per role). A returned error means the call failed after the
/// transport's own retries were exhausted.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratorResponse, TransportError>;

    /// Get generator name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_request_shape() {
        let req = GenerationRequest::prompt(AgentRole::Drafter, "Write it")
            .with_system("You are a novelist")
            .with_sampling(SamplingParams::new(0.9));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.last_user_text(), "Write it");
        assert_eq!(req.system.as_deref(), Some("You are a novelist"));
        assert!((req.sampling.temperature - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_last_user_text_in_conversation() {
        let req = GenerationRequest::conversation(
            AgentRole::Planner,
            vec![
                Message::user("first"),
                Message::assistant("ok"),
                Message::user("second"),
            ],
        );
        assert_eq!(req.last_user_text(), "second");
    }

    #[test]
    fn test_role_names() {
        assert_eq!(AgentRole::ContinuityEditor.to_string(), "continuity_editor");
        assert_eq!(
            serde_json::to_string(&AgentRole::GrammarEditor).unwrap(),
            "\"grammar_editor\""
        );
    }
}
