// Pipeline inputs and outputs

use serde::{Deserialize, Serialize};

use crate::compression::RangeContext;
use crate::editors::{EditReference, StageReport};
use crate::evaluator::ScoreRecord;
use crate::retriever::Snippet;
use crate::store::ChapterUnit;

/// A writing assignment for one chapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub project_id: String,
    pub chapter_number: u32,
    /// What this chapter must accomplish
    pub outline: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Defaults to `pipeline.target_word_count`
    #[serde(default)]
    pub target_word_count: Option<usize>,
}

impl Assignment {
    pub fn new(project_id: impl Into<String>, chapter_number: u32, outline: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            chapter_number,
            outline: outline.into(),
            title: None,
            target_word_count: None,
        }
    }
}

/// Caller-supplied reference material shared by every chapter of a project.
/// All of it is optional; missing material lowers quality but never fails a stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectMaterials {
    pub project_outline: Option<String>,
    pub style_guide: Option<String>,
    pub reference_excerpt: Option<String>,
    pub story_bible: Option<String>,
}

/// Everything a drafting or evaluation call is grounded on
#[derive(Debug, Clone, Default)]
pub struct WritingBrief {
    pub chapter_number: u32,
    pub outline: String,
    pub project_outline: Option<String>,
    /// Most recent completed chapters, verbatim, oldest first
    pub recent_chapters: Vec<(u32, String)>,
    /// Summaries covering everything older than `recent_chapters`
    pub history: RangeContext,
    pub snippets: Vec<Snippet>,
    /// Planner output for this chapter
    pub instructions: Option<String>,
    pub estimated_tokens: usize,
    pub window_summarized: bool,
}

impl WritingBrief {
    /// Story-so-far block shared by the drafter, reviser and critic
    pub fn context_text(&self) -> String {
        let mut out = String::new();
        if !self.history.summaries.is_empty() {
            out.push_str("## Earlier chapters (summarized)\n");
            out.push_str(&self.history.render());
            out.push_str("\n\n");
        }
        let threads = self.history.unresolved_threads();
        if !threads.is_empty() {
            out.push_str("## Unresolved threads\n");
            for thread in &threads {
                out.push_str(&format!("- {thread}\n"));
            }
            out.push('\n');
        }
        for (number, content) in &self.recent_chapters {
            out.push_str(&format!("## Chapter {number} (full text)\n{content}\n\n"));
        }
        if !self.snippets.is_empty() {
            out.push_str("## Related passages\n");
            for snippet in &self.snippets {
                out.push_str(&format!("(chapter {}) {}\n\n", snippet.chapter_number, snippet.text));
            }
        }
        out.trim_end().to_string()
    }

    /// Continuity reference for the critic and the continuity editor
    pub fn continuity_reference(&self, materials: &ProjectMaterials) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(bible) = materials.story_bible.as_deref().filter(|b| !b.trim().is_empty()) {
            parts.push(format!("Story bible:\n{bible}"));
        }
        let threads = self.history.unresolved_threads();
        if !threads.is_empty() {
            parts.push(format!("Open threads: {}", threads.join("; ")));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    pub fn edit_reference(&self, materials: &ProjectMaterials) -> EditReference {
        let previous = if self.history.summaries.is_empty() {
            None
        } else {
            Some(self.history.render())
        };
        EditReference {
            style_guide: materials.style_guide.clone(),
            reference_excerpt: materials.reference_excerpt.clone(),
            story_bible: self.continuity_reference(materials),
            previous_summary: previous,
        }
    }
}

/// Terminal result of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub chapter: ChapterUnit,
    pub content: String,
    pub final_score: ScoreRecord,
    /// Reviser → editor chain → evaluator cycles performed
    pub iterations: usize,
    /// Editor stage reports of the last revision, if any
    pub last_edit: Vec<StageReport>,
}

impl PipelineOutcome {
    pub fn needs_review(&self) -> bool {
        self.chapter.needs_review
    }
}
