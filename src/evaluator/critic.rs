// LLM-backed critic: prompts the generator, parses scores, applies the revision policy

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::types::{weighted_mean, Priority, ScoreRecord, Suggestion};
use super::{EvaluationRequest, Evaluator};
use crate::config::Config;
use crate::errors::TransportError;
use crate::generators::{AgentRole, GenerationRequest, Generator};
use crate::llm::SamplingParams;
use crate::parsing::{parse_json, Parsed};

const CRITIC_SYSTEM: &str = "You are a demanding fiction editor. You score chapters \
honestly on a 1-10 scale and give specific, actionable feedback. \
You always answer with a single JSON object and nothing else.";

/// Score thresholds that turn an overall score into a revision decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevisionPolicy {
    pub quality_threshold: f64,
    pub min_acceptable_score: f64,
}

impl Default for RevisionPolicy {
    fn default() -> Self {
        Self {
            quality_threshold: 7.0,
            min_acceptable_score: 5.0,
        }
    }
}

impl RevisionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quality_threshold: config.pipeline.quality_threshold,
            min_acceptable_score: config.pipeline.min_acceptable_score,
        }
    }

    pub fn should_revise(&self, overall: f64, explicit: bool, suggestions: &[Suggestion]) -> bool {
        overall < self.min_acceptable_score
            || overall < self.quality_threshold
            || explicit
            || suggestions.iter().any(|s| s.priority >= Priority::High)
    }

    pub fn priority(&self, overall: f64, explicit: bool, suggestions: &[Suggestion]) -> Priority {
        if overall < self.min_acceptable_score {
            Priority::Critical
        } else if overall < self.quality_threshold {
            Priority::High
        } else if explicit || suggestions.iter().any(|s| s.priority >= Priority::High) {
            Priority::Medium
        } else if !suggestions.is_empty() {
            Priority::Low
        } else {
            Priority::None
        }
    }
}

/// Raw JSON shape from the critic; every field optional
#[derive(Debug, Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    #[serde(default)]
    overall_score: Option<f64>,
    #[serde(default)]
    overall_assessment: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    suggestions: Vec<RawSuggestion>,
    #[serde(default)]
    continuity_issues: Vec<Value>,
    #[serde(default)]
    requires_revision: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    issue: String,
    #[serde(default)]
    suggestion: String,
    #[serde(default)]
    priority: Option<String>,
}

impl From<RawSuggestion> for Suggestion {
    fn from(raw: RawSuggestion) -> Self {
        Suggestion {
            issue: raw.issue,
            suggestion: raw.suggestion,
            priority: raw
                .priority
                .as_deref()
                .and_then(Priority::parse_lenient)
                .unwrap_or(Priority::Medium),
        }
    }
}

/// Continuity issues arrive as strings or as `{issue, ...}` objects
fn issue_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Object(map) => {
            let text = map
                .get("issue")
                .or_else(|| map.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string);
            text.or_else(|| Some(Value::Object(map).to_string()))
        }
        _ => None,
    }
}

pub struct LlmEvaluator {
    generator: Arc<dyn Generator>,
    sampling: SamplingParams,
    policy: RevisionPolicy,
    weights: HashMap<String, f64>,
}

impl LlmEvaluator {
    pub fn new(generator: Arc<dyn Generator>, config: &Config) -> Self {
        Self {
            generator,
            sampling: config.roles.critic.sampling(),
            policy: RevisionPolicy::from_config(config),
            weights: config.evaluator.weights.clone(),
        }
    }

    pub fn with_policy(mut self, policy: RevisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn build_prompt(request: &EvaluationRequest) -> String {
        let mut prompt = format!(
            "Evaluate chapter {} (version {}).\n\n",
            request.chapter_number, request.version
        );
        if !request.context.trim().is_empty() {
            prompt.push_str("## Story context\n");
            prompt.push_str(&request.context);
            prompt.push_str("\n\n");
        }
        if let Some(reference) = request.reference.as_deref().filter(|r| !r.trim().is_empty()) {
            prompt.push_str("## Continuity reference\n");
            prompt.push_str(reference);
            prompt.push_str("\n\n");
        }
        prompt.push_str("## Chapter\n");
        prompt.push_str(&request.content);
        prompt.push_str(
            "\n\nRespond with JSON:\n\
             {\"scores\": {\"<dimension>\": <1-10>, ...},\n\
             \"overall_assessment\": \"...\",\n\
             \"strengths\": [\"...\"], \"weaknesses\": [\"...\"],\n\
             \"suggestions\": [{\"issue\": \"...\", \"suggestion\": \"...\", \"priority\": \"low|medium|high\"}],\n\
             \"continuity_issues\": [\"...\"],\n\
             \"requires_revision\": true|false}",
        );
        prompt
    }

    fn record_from_raw(&self, request: &EvaluationRequest, raw: RawEvaluation) -> ScoreRecord {
        let suggestions: Vec<Suggestion> = raw.suggestions.into_iter().map(Suggestion::from).collect();

        let mut record = ScoreRecord::new(
            request.chapter_id,
            request.version,
            raw.scores,
            0.0,
            false,
            Priority::None,
        );
        // Overall is recomputed from the clamped dimensions; the model's own
        // figure is used only when it reported no dimensions
        record.overall_score = if record.dimension_scores.is_empty() {
            raw.overall_score.unwrap_or(0.0).clamp(0.0, 10.0)
        } else {
            weighted_mean(&record.dimension_scores, &self.weights)
        };

        let explicit = raw.requires_revision.unwrap_or(false);
        let overall = record.overall_score;
        record.requires_revision = self.policy.should_revise(overall, explicit, &suggestions);
        record.priority = self.policy.priority(overall, explicit, &suggestions);

        record.assessment = raw.overall_assessment;
        record.strengths = raw.strengths;
        record.weaknesses = raw.weaknesses;
        record.suggestions = suggestions;
        record.continuity_issues = raw.continuity_issues.into_iter().filter_map(issue_text).collect();
        record
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<ScoreRecord, TransportError> {
        let generation = GenerationRequest::prompt(AgentRole::Critic, Self::build_prompt(&request))
            .with_system(CRITIC_SYSTEM)
            .with_sampling(self.sampling);

        let response = self.generator.generate(generation).await?;

        let record = match parse_json::<RawEvaluation>(&response.text) {
            Parsed::Parsed(raw) => self.record_from_raw(&request, raw),
            Parsed::Unparsed { raw, reason } => {
                tracing::warn!(
                    chapter = request.chapter_number,
                    version = request.version,
                    %reason,
                    "Failed to parse critic response; recording fallback score"
                );
                ScoreRecord::unparsed(request.chapter_id, request.version, raw, reason)
            }
        };

        tracing::info!(
            chapter = request.chapter_number,
            version = request.version,
            overall = record.overall_score,
            requires_revision = record.requires_revision,
            priority = %record.priority,
            "Chapter evaluated"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::GeneratorResponse;
    use uuid::Uuid;

    struct FixedGenerator(String);

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<GeneratorResponse, TransportError> {
            assert_eq!(request.role, AgentRole::Critic);
            Ok(GeneratorResponse::text(self.0.clone()))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct DownGenerator;

    #[async_trait]
    impl Generator for DownGenerator {
        async fn generate(&self, _request: GenerationRequest) -> Result<GeneratorResponse, TransportError> {
            Err(TransportError::Unreachable("connection refused".into()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            chapter_id: Uuid::new_v4(),
            chapter_number: 3,
            version: 2,
            content: "The storm broke over the harbour.".into(),
            context: "Chapter 2 summary".into(),
            reference: None,
        }
    }

    fn evaluator(text: &str) -> LlmEvaluator {
        LlmEvaluator::new(Arc::new(FixedGenerator(text.to_string())), &Config::default())
    }

    #[test]
    fn test_policy_thresholds() {
        let policy = RevisionPolicy::default();
        assert_eq!(policy.priority(4.0, false, &[]), Priority::Critical);
        assert_eq!(policy.priority(6.5, false, &[]), Priority::High);
        assert_eq!(policy.priority(8.0, true, &[]), Priority::Medium);
        assert_eq!(policy.priority(8.0, false, &[]), Priority::None);
        assert!(policy.should_revise(6.9, false, &[]));
        assert!(!policy.should_revise(7.0, false, &[]));
    }

    #[test]
    fn test_policy_suggestions() {
        let policy = RevisionPolicy::default();
        let low = vec![Suggestion {
            issue: "pacing".into(),
            suggestion: "trim".into(),
            priority: Priority::Low,
        }];
        assert!(!policy.should_revise(8.5, false, &low));
        assert_eq!(policy.priority(8.5, false, &low), Priority::Low);

        let high = vec![Suggestion {
            priority: Priority::High,
            ..low[0].clone()
        }];
        assert!(policy.should_revise(8.5, false, &high));
        assert_eq!(policy.priority(8.5, false, &high), Priority::Medium);
    }

    #[tokio::test]
    async fn test_parses_scores_and_recomputes_overall() {
        let eval = evaluator(
            r#"```json
{"scores": {"prose": 9, "pacing": 7}, "overall_score": 2.0,
 "overall_assessment": "Strong", "suggestions": [],
 "continuity_issues": ["Mara's scar moved arms", {"issue": "wrong day"}],
 "requires_revision": false}
```"#,
        );
        let record = eval.evaluate(request()).await.unwrap();
        assert!((record.overall_score - 8.0).abs() < 1e-9);
        assert!(!record.requires_revision);
        assert_eq!(record.priority, Priority::None);
        assert_eq!(record.version, 2);
        assert_eq!(record.continuity_issues, vec!["Mara's scar moved arms", "wrong day"]);
        assert!(!record.is_fallback());
    }

    #[tokio::test]
    async fn test_caller_weights_apply() {
        let mut config = Config::default();
        config.evaluator.weights.insert("prose".into(), 3.0);
        let eval = LlmEvaluator::new(
            Arc::new(FixedGenerator(r#"{"scores": {"prose": 9, "pacing": 5}}"#.into())),
            &config,
        );
        let record = eval.evaluate(request()).await.unwrap();
        // (9*3 + 5) / 4 = 8
        assert!((record.overall_score - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_explicit_request_without_low_score_gets_medium() {
        let eval = evaluator(r#"{"scores": {"prose": 9}, "requires_revision": true}"#);
        let record = eval.evaluate(request()).await.unwrap();
        assert!(record.requires_revision);
        assert_eq!(record.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_unknown_suggestion_priority_defaults_to_medium() {
        let eval = evaluator(
            r#"{"scores": {"prose": 9}, "suggestions": [{"issue": "x", "suggestion": "y", "priority": "whenever"}]}"#,
        );
        let record = eval.evaluate(request()).await.unwrap();
        assert_eq!(record.suggestions[0].priority, Priority::Medium);
        assert_eq!(record.priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_unparseable_response_falls_back() {
        let eval = evaluator("This chapter is lovely, 9/10!");
        let record = eval.evaluate(request()).await.unwrap();
        assert_eq!(record.overall_score, 0.0);
        assert!(record.requires_revision);
        assert_eq!(record.priority, Priority::High);
        assert_eq!(record.raw_response.as_deref(), Some("This chapter is lovely, 9/10!"));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let eval = LlmEvaluator::new(Arc::new(DownGenerator), &Config::default());
        let err = eval.evaluate(request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }
}
