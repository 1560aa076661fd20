// LLM transport: chat types, retry policy and the Ollama HTTP client

pub mod ollama;
pub mod retry;
pub mod types;

pub use ollama::{ChatRequest, ChatResponse, OllamaClient};
pub use retry::{with_retry, RetryPolicy};
pub use types::{
    Message, SamplingParams, ToolDefinition, ToolInputSchema, ToolResult, ToolUse,
};
