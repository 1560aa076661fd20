// Evaluation types: ScoreRecord, Priority, Suggestion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Revision urgency, ordered from `None` to `Critical`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::None => "none",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Case-insensitive parse of model-produced labels; unknown labels are None
    pub fn parse_lenient(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Priority::None),
            "low" | "minor" => Some(Priority::Low),
            "medium" | "moderate" => Some(Priority::Medium),
            "high" | "major" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One actionable improvement from the critic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub issue: String,
    pub suggestion: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Output of one evaluation call. Append-only: never edited once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: Uuid,
    pub chapter_id: Uuid,
    /// Content version this record scores
    pub version: u32,
    /// Dimension name → score in [1, 10]
    pub dimension_scores: BTreeMap<String, f64>,
    pub overall_score: f64,
    pub requires_revision: bool,
    pub priority: Priority,
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub continuity_issues: Vec<String>,
    /// Raw critic output, kept when it could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScoreRecord {
    /// Build a record, clamping dimension scores into [1, 10].
    ///
    /// A record that requires revision never carries priority `None`; it is
    /// raised to `Medium` so a failed quality gate stays visible.
    pub fn new(
        chapter_id: Uuid,
        version: u32,
        dimension_scores: BTreeMap<String, f64>,
        overall_score: f64,
        requires_revision: bool,
        priority: Priority,
    ) -> Self {
        let dimension_scores = dimension_scores
            .into_iter()
            .map(|(k, v)| (k, clamp_score(v)))
            .collect();
        let priority = if requires_revision && priority == Priority::None {
            Priority::Medium
        } else {
            priority
        };
        Self {
            id: Uuid::new_v4(),
            chapter_id,
            version,
            dimension_scores,
            overall_score,
            requires_revision,
            priority,
            assessment: String::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            suggestions: Vec::new(),
            continuity_issues: Vec::new(),
            raw_response: None,
            parse_error: None,
            created_at: Utc::now(),
        }
    }

    /// Fallback record for critic output that could not be parsed
    pub fn unparsed(chapter_id: Uuid, version: u32, raw: String, reason: String) -> Self {
        let mut record = Self::new(chapter_id, version, BTreeMap::new(), 0.0, true, Priority::High);
        record.assessment = raw.clone();
        record.raw_response = Some(raw);
        record.parse_error = Some(reason);
        record
    }

    pub fn with_assessment(mut self, assessment: impl Into<String>) -> Self {
        self.assessment = assessment.into();
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<Suggestion>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.parse_error.is_some()
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        1.0
    } else {
        score.clamp(1.0, 10.0)
    }
}

/// Weighted mean of dimension scores.
///
/// Dimensions missing from `weights` get weight 1.0, so an empty map is the
/// equal-weight mean. Returns 0.0 for no scores or a zero total weight.
pub fn weighted_mean(scores: &BTreeMap<String, f64>, weights: &HashMap<String, f64>) -> f64 {
    let (sum, total) = scores.iter().fold((0.0, 0.0), |(sum, total), (dim, score)| {
        let w = weights.get(dim).copied().unwrap_or(1.0);
        (sum + score * w, total + w)
    });
    if total > 0.0 {
        sum / total
    } else {
        0.0
    }
}
