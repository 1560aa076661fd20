// Persisted domain records: chapters, content versions, summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{ErrorKind, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Planning,
    Drafting,
    Evaluating,
    Revising,
    Completed,
    Failed,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Planning => "planning",
            ChapterStatus::Drafting => "drafting",
            ChapterStatus::Evaluating => "evaluating",
            ChapterStatus::Revising => "revising",
            ChapterStatus::Completed => "completed",
            ChapterStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChapterStatus::Completed | ChapterStatus::Failed)
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explanation attached to a chapter whose last attempt failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PipelineError> for ChapterError {
    fn from(e: &PipelineError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// The addressable unit of content, identified by `(project_id, chapter_number)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterUnit {
    pub id: Uuid,
    pub project_id: String,
    pub chapter_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// What this chapter must accomplish
    pub outline: String,
    pub target_word_count: usize,
    pub status: ChapterStatus,
    pub word_count: usize,
    /// Accepted content version; 0 until a draft exists
    pub version: u32,
    /// Accepted after the revision budget ran out without a passing score
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ChapterError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChapterUnit {
    pub fn new(
        project_id: impl Into<String>,
        chapter_number: u32,
        outline: impl Into<String>,
        target_word_count: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            chapter_number,
            title: None,
            outline: outline.into(),
            target_word_count,
            status: ChapterStatus::Planning,
            word_count: 0,
            version: 0,
            needs_review: false,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.project_id, self.chapter_number)
    }

    pub fn has_content(&self) -> bool {
        self.version > 0
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Pipeline stage that authored a content version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducedBy {
    Drafter,
    Reviser,
    RevisionPipeline,
    GrammarEditor,
    StyleEditor,
    ContinuityEditor,
    Manual,
}

impl ProducedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProducedBy::Drafter => "drafter",
            ProducedBy::Reviser => "reviser",
            ProducedBy::RevisionPipeline => "revision_pipeline",
            ProducedBy::GrammarEditor => "grammar_editor",
            ProducedBy::StyleEditor => "style_editor",
            ProducedBy::ContinuityEditor => "continuity_editor",
            ProducedBy::Manual => "manual",
        }
    }
}

impl fmt::Display for ProducedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a chapter's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentVersion {
    pub chapter_id: Uuid,
    pub version: u32,
    pub content: String,
    pub produced_by: ProducedBy,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ContentVersion {
    pub fn new(chapter_id: Uuid, version: u32, content: impl Into<String>, produced_by: ProducedBy) -> Self {
        Self {
            chapter_id,
            version,
            content: content.into(),
            produced_by,
            created_at: Utc::now(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Inclusive chapter-number range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChapterRange {
    pub start: u32,
    pub end: u32,
}

impl ChapterRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn single(n: u32) -> Self {
        Self { start: n, end: n }
    }

    pub fn contains(&self, n: u32) -> bool {
        self.start <= n && n <= self.end
    }

    pub fn overlaps(&self, other: &ChapterRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn len(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn numbers(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for ChapterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Pointer from a meta-summary to one constituent summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: Uuid,
    pub range: ChapterRange,
    pub fingerprint: String,
}

/// What a summary was produced from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "refs", rename_all = "snake_case")]
pub enum SummarySource {
    /// Raw chapter content
    Chapters,
    /// Other summaries (a meta-summary)
    Summaries(Vec<SourceRef>),
}

/// Compressed representation of one or more chapters.
///
/// At most one row exists per `(project_id, range)`; writing the same range
/// replaces it. A summary with `superseded_by` set is excluded from context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    pub project_id: String,
    pub range: ChapterRange,
    pub text: String,
    pub fingerprint: String,
    pub source: SummarySource,
    #[serde(default)]
    pub unresolved_threads: Vec<String>,
    pub source_word_count: usize,
    pub summary_word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Summary {
    pub fn is_meta(&self) -> bool {
        matches!(self.source, SummarySource::Summaries(_))
    }

    pub fn is_live(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Source words per summary word; 0.0 for an empty summary
    pub fn compression_ratio(&self) -> f64 {
        if self.summary_word_count == 0 {
            0.0
        } else {
            self.source_word_count as f64 / self.summary_word_count as f64
        }
    }
}
