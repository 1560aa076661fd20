// Configuration structs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::generators::AgentRole;
use crate::llm::SamplingParams;

/// Revision-loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum reviser → editor chain → evaluator cycles before forced acceptance
    pub max_revision_iterations: usize,
    /// Overall score below which the critic recommends revision
    pub quality_threshold: f64,
    /// Overall score below which revision is mandatory (priority critical)
    pub min_acceptable_score: f64,
    /// Default target length of a drafted chapter, in words
    pub target_word_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revision_iterations: 3,
            quality_threshold: 7.0,
            min_acceptable_score: 5.0,
            target_word_count: 3000,
        }
    }
}

/// Context-compression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Most recent completed chapters kept as raw, unsummarized context
    pub retained_chapters: usize,
    /// Context usage ratio at which window summarization is pulled
    pub context_threshold: f64,
    /// Token budget for the context assembled into a brief
    pub max_context_tokens: usize,
    /// Target source:summary word ratio
    pub compression_ratio: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            retained_chapters: 2,
            context_threshold: 0.8,
            max_context_tokens: 32768,
            compression_ratio: 10,
        }
    }
}

/// Generator transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama server base URL
    pub base_url: String,
    /// Model used by every role without its own override
    pub default_model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Transport-level attempts per request (1 = no retry)
    pub max_retries: u32,
    /// Base delay of the exponential backoff between attempts
    pub retry_base_delay_ms: u64,
    /// Model context window passed as `num_ctx`
    pub num_ctx: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama3.1:8b".to_string(),
            timeout_secs: 120,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            num_ctx: 32768,
        }
    }
}

/// Sampling settings for one agent role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Model override (falls back to `llm.default_model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl RoleConfig {
    fn with_temperature(temperature: f32, max_tokens: Option<u32>) -> Self {
        Self {
            model: None,
            temperature,
            max_tokens,
        }
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Per-role sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub planner: RoleConfig,
    pub drafter: RoleConfig,
    pub reviser: RoleConfig,
    pub critic: RoleConfig,
    pub grammar: RoleConfig,
    pub style: RoleConfig,
    pub continuity: RoleConfig,
    pub summarizer: RoleConfig,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            planner: RoleConfig::with_temperature(0.7, Some(1500)),
            drafter: RoleConfig::with_temperature(0.8, None),
            reviser: RoleConfig::with_temperature(0.7, Some(6000)),
            critic: RoleConfig::with_temperature(0.3, Some(4096)),
            grammar: RoleConfig::with_temperature(0.2, None),
            style: RoleConfig::with_temperature(0.5, None),
            continuity: RoleConfig::with_temperature(0.3, None),
            summarizer: RoleConfig::with_temperature(0.3, Some(2048)),
        }
    }
}

impl RolesConfig {
    pub fn for_role(&self, role: AgentRole) -> &RoleConfig {
        match role {
            AgentRole::Planner => &self.planner,
            AgentRole::Drafter => &self.drafter,
            AgentRole::Reviser => &self.reviser,
            AgentRole::Critic => &self.critic,
            AgentRole::GrammarEditor => &self.grammar,
            AgentRole::StyleEditor => &self.style,
            AgentRole::ContinuityEditor => &self.continuity,
            AgentRole::Summarizer => &self.summarizer,
        }
    }

    fn all(&self) -> [(AgentRole, &RoleConfig); 8] {
        [
            (AgentRole::Planner, &self.planner),
            (AgentRole::Drafter, &self.drafter),
            (AgentRole::Reviser, &self.reviser),
            (AgentRole::Critic, &self.critic),
            (AgentRole::GrammarEditor, &self.grammar),
            (AgentRole::StyleEditor, &self.style),
            (AgentRole::ContinuityEditor, &self.continuity),
            (AgentRole::Summarizer, &self.summarizer),
        ]
    }
}

/// Evaluator dimension weighting
///
/// An empty map means every dimension the critic reports is weighted equally.
/// Dimensions absent from a non-empty map get weight 1.0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub weights: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".quill")
            .join("quill.db");
        Self { path }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub enabled: bool,
    /// Snippets added to a drafting brief
    pub top_k: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// Emit JSON log lines instead of human-readable output
    pub json: bool,
    /// Append pipeline lifecycle events to this JSONL file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            event_log: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub compression: CompressionConfig,
    pub llm: LlmConfig,
    pub roles: RolesConfig,
    pub evaluator: EvaluatorConfig,
    pub store: StoreConfig,
    pub retriever: RetrieverConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Model name for a role after applying the default-model fallback
    pub fn model_for(&self, role: AgentRole) -> &str {
        self.roles
            .for_role(role)
            .model
            .as_deref()
            .unwrap_or(&self.llm.default_model)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.pipeline;
        if !(1.0..=10.0).contains(&p.quality_threshold) {
            anyhow::bail!(
                "pipeline.quality_threshold must be within [1, 10], got {}",
                p.quality_threshold
            );
        }
        if p.min_acceptable_score > p.quality_threshold {
            anyhow::bail!(
                "pipeline.min_acceptable_score ({}) exceeds quality_threshold ({})",
                p.min_acceptable_score,
                p.quality_threshold
            );
        }

        let c = &self.compression;
        if !(c.context_threshold > 0.0 && c.context_threshold <= 1.0) {
            anyhow::bail!(
                "compression.context_threshold must be within (0, 1], got {}",
                c.context_threshold
            );
        }
        if c.max_context_tokens == 0 {
            anyhow::bail!("compression.max_context_tokens must be positive");
        }
        if c.compression_ratio == 0 {
            anyhow::bail!("compression.compression_ratio must be positive");
        }

        if self.llm.max_retries == 0 {
            anyhow::bail!("llm.max_retries must be at least 1");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be positive");
        }

        for (role, rc) in self.roles.all() {
            if !(0.0..=2.0).contains(&rc.temperature) {
                anyhow::bail!(
                    "roles.{}.temperature must be within [0, 2], got {}",
                    role.as_str(),
                    rc.temperature
                );
            }
        }

        if let Some((dim, w)) = self.evaluator.weights.iter().find(|(_, w)| **w < 0.0) {
            anyhow::bail!("evaluator.weights.{dim} must not be negative, got {w}");
        }

        Ok(())
    }
}
