// Chapter pipeline: planning → drafting → evaluating → {revising → editing → evaluating}* → completed | failed
//
// The controller assumes exclusive ownership of the chapter it drives; callers
// serialize runs of the same (project, chapter). Every generator stage either
// succeeds with a result or fails the attempt, except inside the revision loop:
// a failed iteration ends the loop at the last persisted version, which is then
// committed for review. Retries live in the transport.

use serde_json::json;
use std::sync::Arc;

use super::prompts;
use super::types::{Assignment, PipelineOutcome, ProjectMaterials, WritingBrief};
use crate::compression::CompressionEngine;
use crate::config::Config;
use crate::editors::{Editor, EditorChain, EditorKind, LlmEditor, StageReport};
use crate::errors::{PipelineError, PipelineResult};
use crate::evaluator::{EvaluationRequest, Evaluator, LlmEvaluator, ScoreRecord};
use crate::events::{EventDispatcher, EventKind, PipelineEvent};
use crate::generators::{AgentRole, GenerationRequest, Generator, GeneratorResponse};
use crate::parsing::word_count;
use crate::retriever::{HashEmbeddingRetriever, Retriever};
use crate::store::{ChapterError, ChapterStatus, ChapterUnit, ContentVersion, ProducedBy, Store};

pub struct ChapterPipeline {
    pub(super) config: Config,
    pub(super) generator: Arc<dyn Generator>,
    pub(super) evaluator: Arc<dyn Evaluator>,
    pub(super) editors: EditorChain,
    pub(super) compression: Arc<CompressionEngine>,
    pub(super) store: Arc<dyn Store>,
    pub(super) retriever: Option<Arc<dyn Retriever>>,
    pub(super) events: Arc<EventDispatcher>,
}

/// Mutable state of one attempt
struct Attempt {
    chapter: ChapterUnit,
    content: String,
    score: Option<ScoreRecord>,
    iterations: usize,
    last_edit: Vec<StageReport>,
    /// Whether this attempt persisted a new content version
    versioned: bool,
    /// Error that ended the revision loop early
    aborted: Option<ChapterError>,
}

impl ChapterPipeline {
    /// Pipeline with the generator-backed critic, editors and summarizer
    pub fn new(config: Config, generator: Arc<dyn Generator>, store: Arc<dyn Store>) -> Self {
        let evaluator: Arc<dyn Evaluator> = Arc::new(LlmEvaluator::new(generator.clone(), &config));
        let editor = |kind: EditorKind| -> Arc<dyn Editor> { Arc::new(LlmEditor::new(kind, generator.clone(), &config)) };
        let editors = EditorChain::new(
            editor(EditorKind::Grammar),
            editor(EditorKind::Style),
            editor(EditorKind::Continuity),
        );
        let compression = Arc::new(CompressionEngine::new(generator.clone(), store.clone(), &config));
        let retriever: Option<Arc<dyn Retriever>> = if config.retriever.enabled {
            Some(Arc::new(HashEmbeddingRetriever::default()))
        } else {
            None
        };
        Self {
            config,
            generator,
            evaluator,
            editors,
            compression,
            store,
            retriever,
            events: Arc::new(EventDispatcher::disabled()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_editors(mut self, editors: EditorChain) -> Self {
        self.editors = editors;
        self
    }

    pub fn with_compression(mut self, compression: Arc<CompressionEngine>) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_retriever(mut self, retriever: Option<Arc<dyn Retriever>>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn compression(&self) -> &Arc<CompressionEngine> {
        &self.compression
    }

    fn emit(&self, chapter: &ChapterUnit, kind: EventKind) {
        self.events
            .emit(PipelineEvent::new(chapter.project_id.clone(), chapter.chapter_number, kind));
    }

    async fn set_status(&self, chapter: &mut ChapterUnit, status: ChapterStatus) -> PipelineResult<()> {
        tracing::debug!(chapter = %chapter.key(), from = %chapter.status, to = %status, "Status transition");
        chapter.status = status;
        chapter.touch();
        self.store.update_chapter(chapter).await?;
        Ok(())
    }

    async fn call(&self, role: AgentRole, system: &str, prompt: String) -> PipelineResult<GeneratorResponse> {
        let request = GenerationRequest::prompt(role, prompt)
            .with_system(system)
            .with_sampling(self.config.roles.for_role(role).sampling());
        Ok(self.generator.generate(request).await?)
    }

    // --- operations ---

    /// Create the chapter, or reset it for a new attempt, in `planning`
    pub async fn assign(&self, assignment: &Assignment) -> PipelineResult<ChapterUnit> {
        if assignment.outline.trim().is_empty() {
            return Err(PipelineError::InvalidState(format!(
                "assignment for {}/{} has an empty outline",
                assignment.project_id, assignment.chapter_number
            )));
        }
        let target = assignment
            .target_word_count
            .unwrap_or(self.config.pipeline.target_word_count);

        let chapter = match self
            .store
            .get_chapter(&assignment.project_id, assignment.chapter_number)
            .await?
        {
            Some(mut existing) => {
                existing.outline = assignment.outline.clone();
                if assignment.title.is_some() {
                    existing.title = assignment.title.clone();
                }
                existing.target_word_count = target;
                existing.status = ChapterStatus::Planning;
                existing.needs_review = false;
                existing.last_error = None;
                existing.touch();
                self.store.update_chapter(&existing).await?;
                existing
            }
            None => {
                let mut chapter = ChapterUnit::new(
                    assignment.project_id.clone(),
                    assignment.chapter_number,
                    assignment.outline.clone(),
                    target,
                );
                chapter.title = assignment.title.clone();
                self.store.create_chapter(&chapter).await?;
                chapter
            }
        };

        tracing::info!(chapter = %chapter.key(), version = chapter.version, "Assignment created");
        self.emit(
            &chapter,
            EventKind::AssignmentCreated {
                outline_words: word_count(&chapter.outline),
                target_word_count: chapter.target_word_count,
            },
        );
        Ok(chapter)
    }

    /// Assign and run the full pipeline
    pub async fn write(&self, assignment: &Assignment, materials: &ProjectMaterials) -> PipelineResult<PipelineOutcome> {
        let chapter = self.assign(assignment).await?;
        self.run(chapter, materials).await
    }

    /// Run the full pipeline for an assigned chapter.
    ///
    /// Planning, drafting and first-evaluation errors leave the chapter
    /// `failed` with the error recorded. A failed revision iteration instead
    /// completes the chapter at its last persisted version with
    /// `needs_review` set and the error kept in `last_error`.
    pub async fn run(&self, chapter: ChapterUnit, materials: &ProjectMaterials) -> PipelineResult<PipelineOutcome> {
        let mut attempt = Attempt {
            chapter,
            content: String::new(),
            score: None,
            iterations: 0,
            last_edit: Vec::new(),
            versioned: false,
            aborted: None,
        };
        match self.run_attempt(&mut attempt, materials).await {
            Ok(()) => self.commit(attempt).await,
            Err(e) => Err(self.fail(attempt, e).await),
        }
    }

    /// Score the accepted version against its brief; appends a score record
    pub async fn critique(&self, project_id: &str, chapter_number: u32, materials: &ProjectMaterials) -> PipelineResult<ScoreRecord> {
        let chapter = self.store.require_chapter(project_id, chapter_number).await?;
        let version = self.store.accepted_content(&chapter).await?.ok_or_else(|| {
            PipelineError::InvalidState(format!("chapter {} has no content to critique", chapter.key()))
        })?;
        let brief = self.assemble_brief(&chapter, materials).await?;
        let score = self
            .evaluate(&chapter, version.version, &version.content, &brief, materials)
            .await?;
        self.emit_evaluated(&chapter, &score);
        Ok(score)
    }

    /// One reviser → editor chain → evaluator cycle on a finished chapter
    pub async fn revise(
        &self,
        project_id: &str,
        chapter_number: u32,
        notes: &str,
        materials: &ProjectMaterials,
    ) -> PipelineResult<PipelineOutcome> {
        let chapter = self.store.require_chapter(project_id, chapter_number).await?;
        if !chapter.status.is_terminal() {
            return Err(PipelineError::InvalidState(format!(
                "chapter {} is {}; only completed or failed chapters can be revised",
                chapter.key(),
                chapter.status
            )));
        }
        let version = self.store.accepted_content(&chapter).await?.ok_or_else(|| {
            PipelineError::InvalidState(format!("chapter {} has no content to revise", chapter.key()))
        })?;
        let latest = self.store.latest_score(chapter.id).await?;

        let mut attempt = Attempt {
            chapter,
            content: version.content,
            score: latest.filter(|s| s.version == version.version),
            iterations: 0,
            last_edit: Vec::new(),
            versioned: false,
            aborted: None,
        };
        match self.revise_attempt(&mut attempt, notes, materials).await {
            Ok(()) => self.commit(attempt).await,
            Err(e) => Err(self.fail(attempt, e).await),
        }
    }

    // --- stages ---

    async fn run_attempt(&self, attempt: &mut Attempt, materials: &ProjectMaterials) -> PipelineResult<()> {
        // planning
        if attempt.chapter.status != ChapterStatus::Planning {
            self.set_status(&mut attempt.chapter, ChapterStatus::Planning).await?;
        }
        let mut brief = self.assemble_brief(&attempt.chapter, materials).await?;
        let plan = self
            .call(
                AgentRole::Planner,
                prompts::PLANNER_SYSTEM,
                prompts::planner(&attempt.chapter, &brief, materials),
            )
            .await?;
        if !plan.text.trim().is_empty() {
            brief.instructions = Some(plan.text);
        }

        // drafting
        self.set_status(&mut attempt.chapter, ChapterStatus::Drafting).await?;
        let draft = self
            .call(
                AgentRole::Drafter,
                prompts::DRAFTER_SYSTEM,
                prompts::draft(&attempt.chapter, &brief, materials),
            )
            .await?;
        let metadata = json!({
            "model": draft.metadata.model,
            "latency_ms": draft.metadata.latency_ms,
            "output_tokens": draft.metadata.output_tokens,
        });
        self.persist_version(attempt, draft.text, ProducedBy::Drafter, metadata).await?;
        self.emit(
            &attempt.chapter,
            EventKind::DraftReady {
                version: attempt.chapter.version,
                word_count: attempt.chapter.word_count,
            },
        );

        // evaluating
        self.evaluate_current(attempt, &brief, materials).await?;

        // bounded revision loop
        let max = self.config.pipeline.max_revision_iterations;
        while attempt.iterations < max && attempt.score.as_ref().is_some_and(|s| s.requires_revision) {
            let notes = attempt
                .score
                .as_ref()
                .map(prompts::revision_notes)
                .unwrap_or_default();
            if let Err(e) = self.revision_iteration(attempt, &notes, &brief, materials).await {
                self.abort_revisions(attempt, e);
                break;
            }
        }

        if attempt.aborted.is_none() && attempt.score.as_ref().is_some_and(|s| s.requires_revision) {
            tracing::warn!(
                chapter = %attempt.chapter.key(),
                iterations = attempt.iterations,
                "Revision budget exhausted; accepting last version for manual review"
            );
        }
        Ok(())
    }

    async fn revise_attempt(&self, attempt: &mut Attempt, notes: &str, materials: &ProjectMaterials) -> PipelineResult<()> {
        let brief = self.assemble_brief(&attempt.chapter, materials).await?;
        if attempt.score.is_none() {
            self.evaluate_current(attempt, &brief, materials).await?;
        }
        if let Err(e) = self.revision_iteration(attempt, notes, &brief, materials).await {
            self.abort_revisions(attempt, e);
        }
        Ok(())
    }

    /// Stop revising and keep the latest persisted version
    fn abort_revisions(&self, attempt: &mut Attempt, error: PipelineError) {
        tracing::warn!(
            chapter = %attempt.chapter.key(),
            version = attempt.chapter.version,
            iteration = attempt.iterations + 1,
            "Revision iteration failed; keeping last version for manual review: {error}"
        );
        self.emit(
            &attempt.chapter,
            EventKind::RevisionAborted {
                version: attempt.chapter.version,
                kind: error.kind(),
                message: error.to_string(),
            },
        );
        attempt.aborted = Some(ChapterError::from(&error));
    }

    async fn evaluate_current(&self, attempt: &mut Attempt, brief: &WritingBrief, materials: &ProjectMaterials) -> PipelineResult<()> {
        self.set_status(&mut attempt.chapter, ChapterStatus::Evaluating).await?;
        let score = self
            .evaluate(&attempt.chapter, attempt.chapter.version, &attempt.content, brief, materials)
            .await?;
        self.emit_evaluated(&attempt.chapter, &score);
        attempt.score = Some(score);
        Ok(())
    }

    async fn evaluate(
        &self,
        chapter: &ChapterUnit,
        version: u32,
        content: &str,
        brief: &WritingBrief,
        materials: &ProjectMaterials,
    ) -> PipelineResult<ScoreRecord> {
        let request = EvaluationRequest {
            chapter_id: chapter.id,
            chapter_number: chapter.chapter_number,
            version,
            content: content.to_string(),
            context: brief.context_text(),
            reference: brief.continuity_reference(materials),
        };
        let score = self.evaluator.evaluate(request).await?;
        self.store.append_score(&score).await?;
        Ok(score)
    }

    fn emit_evaluated(&self, chapter: &ChapterUnit, score: &ScoreRecord) {
        self.emit(
            chapter,
            EventKind::Evaluated {
                version: score.version,
                overall_score: score.overall_score,
                requires_revision: score.requires_revision,
                priority: score.priority,
            },
        );
    }

    async fn revision_iteration(
        &self,
        attempt: &mut Attempt,
        notes: &str,
        brief: &WritingBrief,
        materials: &ProjectMaterials,
    ) -> PipelineResult<()> {
        let iteration = attempt.iterations + 1;
        let max = self.config.pipeline.max_revision_iterations.max(iteration);
        self.set_status(&mut attempt.chapter, ChapterStatus::Revising).await?;
        self.emit(
            &attempt.chapter,
            EventKind::RevisionIteration {
                iteration,
                max_iterations: max,
            },
        );
        tracing::info!(chapter = %attempt.chapter.key(), iteration, max, "Revision iteration");

        let score = attempt.score.clone().ok_or_else(|| {
            PipelineError::InvalidState(format!("chapter {} has no score to revise against", attempt.chapter.key()))
        })?;
        let revised = self
            .call(
                AgentRole::Reviser,
                prompts::REVISER_SYSTEM,
                prompts::revise(&attempt.chapter, &attempt.content, &score, notes, brief),
            )
            .await?;

        // editing
        tracing::debug!(chapter = %attempt.chapter.key(), "Running editor chain");
        let chain = self
            .editors
            .run(revised.text, &brief.edit_reference(materials))
            .await?;

        let metadata = json!({
            "iteration": iteration,
            "revised_from": attempt.chapter.version,
            "editor_changes": chain.total_changes(),
            "stages": &chain.stages,
        });
        attempt.last_edit = chain.stages;
        self.persist_version(attempt, chain.content, ProducedBy::RevisionPipeline, metadata)
            .await?;
        attempt.iterations = iteration;

        self.evaluate_current(attempt, brief, materials).await
    }

    async fn persist_version(
        &self,
        attempt: &mut Attempt,
        content: String,
        produced_by: ProducedBy,
        metadata: serde_json::Value,
    ) -> PipelineResult<()> {
        let next = attempt.chapter.version + 1;
        let version = ContentVersion::new(attempt.chapter.id, next, content, produced_by).with_metadata(metadata);
        self.store.append_version(&version).await?;

        attempt.versioned = true;
        attempt.chapter.version = next;
        attempt.chapter.word_count = word_count(&version.content);
        attempt.chapter.touch();
        self.store.update_chapter(&attempt.chapter).await?;
        tracing::info!(
            chapter = %attempt.chapter.key(),
            version = next,
            produced_by = %produced_by,
            words = attempt.chapter.word_count,
            "Content version persisted"
        );
        attempt.content = version.content;
        Ok(())
    }

    // --- terminal states ---

    async fn commit(&self, mut attempt: Attempt) -> PipelineResult<PipelineOutcome> {
        let score = attempt.score.take().ok_or_else(|| {
            PipelineError::InvalidState(format!("chapter {} finished without a score", attempt.chapter.key()))
        })?;

        let chapter = &mut attempt.chapter;
        chapter.needs_review = score.requires_revision || attempt.aborted.is_some();
        chapter.last_error = attempt.aborted.take();
        self.set_status(chapter, ChapterStatus::Completed).await?;

        if attempt.versioned {
            self.after_commit(chapter, &attempt.content).await;
        }

        tracing::info!(
            chapter = %chapter.key(),
            version = chapter.version,
            overall = score.overall_score,
            priority = %score.priority,
            needs_review = chapter.needs_review,
            iterations = attempt.iterations,
            "Chapter completed"
        );
        self.emit(
            chapter,
            EventKind::Completed {
                version: chapter.version,
                overall_score: score.overall_score,
                priority: score.priority,
                needs_review: chapter.needs_review,
            },
        );

        Ok(PipelineOutcome {
            chapter: attempt.chapter,
            content: attempt.content,
            final_score: score,
            iterations: attempt.iterations,
            last_edit: attempt.last_edit,
        })
    }

    /// Index and summarize newly accepted content. Failures here leave the
    /// commit intact; summaries are regenerated on the next brief.
    async fn after_commit(&self, chapter: &ChapterUnit, content: &str) {
        if let Some(retriever) = &self.retriever {
            if let Err(e) = retriever.index(&chapter.project_id, chapter.chapter_number, content).await {
                tracing::warn!(chapter = %chapter.key(), "Retriever indexing failed: {e:#}");
            }
        }

        match self
            .compression
            .on_chapter_committed(&chapter.project_id, chapter.chapter_number)
            .await
        {
            Ok(report) => {
                for summary in report.chapter_summary.iter().chain(report.meta_summary.iter()) {
                    self.emit(
                        chapter,
                        EventKind::SummaryCreated {
                            range: summary.range,
                            meta: summary.is_meta(),
                        },
                    );
                }
            }
            Err(e) => {
                tracing::warn!(chapter = %chapter.key(), "Compression after commit failed: {e}");
            }
        }
    }

    async fn fail(&self, mut attempt: Attempt, error: PipelineError) -> PipelineError {
        let chapter = &mut attempt.chapter;
        tracing::error!(chapter = %chapter.key(), status = %chapter.status, "Pipeline attempt failed: {error}");

        chapter.status = ChapterStatus::Failed;
        chapter.last_error = Some(ChapterError::from(&error));
        chapter.touch();
        if let Err(e) = self.store.update_chapter(chapter).await {
            tracing::error!(chapter = %chapter.key(), "Could not record failure: {e}");
        }

        if attempt.versioned {
            if let Err(e) = self
                .compression
                .invalidate_chapter(&chapter.project_id, chapter.chapter_number)
                .await
            {
                tracing::warn!(chapter = %chapter.key(), "Summary invalidation failed: {e}");
            }
        }

        self.emit(
            chapter,
            EventKind::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        );
        error
    }
}
