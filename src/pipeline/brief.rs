// Writing-brief assembly
//
// Precedence, newest first: the last `retained_chapters` completed chapters
// verbatim, then chapter summaries, then meta-summaries for everything older.
// When the assembled context crosses the compression threshold the older
// summaries are consolidated into one window summary.

use super::controller::ChapterPipeline;
use super::types::{ProjectMaterials, WritingBrief};
use crate::compression::estimate_tokens;
use crate::errors::{PipelineError, PipelineResult};
use crate::retriever::Snippet;
use crate::store::{ChapterRange, ChapterStatus, ChapterUnit};

impl ChapterPipeline {
    /// Build the brief for drafting or evaluating `chapter`.
    ///
    /// Only completed chapters numbered below `chapter` contribute.
    pub async fn assemble_brief(&self, chapter: &ChapterUnit, materials: &ProjectMaterials) -> PipelineResult<WritingBrief> {
        let project_id = chapter.project_id.as_str();
        let retained = self.config.compression.retained_chapters;

        let prior: Vec<ChapterUnit> = self
            .store
            .list_chapters(project_id)
            .await?
            .into_iter()
            .filter(|c| c.chapter_number < chapter.chapter_number)
            .filter(|c| c.status == ChapterStatus::Completed && c.has_content())
            .collect();

        let split = prior.len().saturating_sub(retained);
        let (older, recent) = prior.split_at(split);

        let mut recent_chapters = Vec::with_capacity(recent.len());
        for unit in recent {
            if let Some(version) = self.store.accepted_content(unit).await? {
                recent_chapters.push((unit.chapter_number, version.content));
            }
        }

        let mut brief = WritingBrief {
            chapter_number: chapter.chapter_number,
            outline: chapter.outline.clone(),
            project_outline: materials.project_outline.clone(),
            recent_chapters,
            ..Default::default()
        };

        if let Some(last_older) = older.last() {
            let range = ChapterRange::new(1, last_older.chapter_number);
            brief.history = self.compression.context_for_range(project_id, range).await?;
            if brief.history.regenerated > 0 || brief.history.purged > 0 {
                tracing::info!(
                    project = project_id,
                    regenerated = brief.history.regenerated,
                    purged = brief.history.purged,
                    "Repaired summary coverage"
                );
            }

            let tokens = estimate_tokens(&brief.context_text()) + estimate_tokens(&chapter.outline);
            let max_tokens = self.config.compression.max_context_tokens;
            if self.compression.should_summarize(tokens, max_tokens) && brief.history.summaries.len() > 1 {
                let covered = ChapterRange::new(
                    brief.history.summaries[0].range.start,
                    brief.history.summaries[brief.history.summaries.len() - 1].range.end,
                );
                match self.compression.consolidate(project_id, covered).await {
                    Ok(Some(window)) => {
                        brief.history.summaries = vec![window];
                        brief.window_summarized = true;
                    }
                    Ok(None) => {}
                    Err(PipelineError::InvalidState(reason)) => {
                        tracing::warn!(project = project_id, %reason, "Window summarization skipped");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        brief.snippets = self.retrieve_snippets(chapter, &brief).await;
        brief.estimated_tokens = estimate_tokens(&brief.context_text()) + estimate_tokens(&chapter.outline);
        tracing::debug!(
            project = project_id,
            chapter = chapter.chapter_number,
            raw = brief.recent_chapters.len(),
            summaries = brief.history.summaries.len(),
            snippets = brief.snippets.len(),
            tokens = brief.estimated_tokens,
            "Brief assembled"
        );
        Ok(brief)
    }

    /// Related passages from chapters not already present verbatim
    async fn retrieve_snippets(&self, chapter: &ChapterUnit, brief: &WritingBrief) -> Vec<Snippet> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        let k = self.config.retriever.top_k;
        if k == 0 {
            return Vec::new();
        }
        let query = format!("{}\n{}", chapter.title.as_deref().unwrap_or(""), chapter.outline);
        match retriever.search(&chapter.project_id, &query, k + brief.recent_chapters.len() + 1).await {
            Ok(hits) => hits
                .into_iter()
                .filter(|s| s.chapter_number < chapter.chapter_number)
                .filter(|s| !brief.recent_chapters.iter().any(|(n, _)| *n == s.chapter_number))
                .take(k)
                .collect(),
            Err(e) => {
                tracing::warn!(project = %chapter.project_id, "Retriever failed; continuing without snippets: {e:#}");
                Vec::new()
            }
        }
    }
}
