// Chapter evaluation: score records, weighting and the revision decision

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::TransportError;

pub mod critic;
pub mod types;

pub use critic::{LlmEvaluator, RevisionPolicy};
pub use types::{weighted_mean, Priority, ScoreRecord, Suggestion};

/// Everything the critic sees for one evaluation
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub chapter_id: Uuid,
    pub chapter_number: u32,
    /// Content version being scored
    pub version: u32,
    pub content: String,
    /// Same context window the chapter was drafted against
    pub context: String,
    /// Continuity reference material (story bible, prior facts)
    pub reference: Option<String>,
}

/// Scores chapter content against its context.
///
/// A parse failure is not an error: implementations return a fallback
/// record. Only transport failures are surfaced.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<ScoreRecord, TransportError>;
}
