// Hierarchical context compression
//
// Chapter summaries are pushed on commit; window summaries are pulled while a
// brief is assembled; meta-summaries fold the oldest live summaries once more
// than `retained + 1` are live. Every summary carries a content fingerprint and
// is deleted (never kept stale) when a chapter in its range changes.
//
// Invariant: live summaries never overlap. Anything folded into a larger
// summary is marked `superseded_by` and only comes back when that larger
// summary is invalidated.

pub mod fingerprint;
pub mod policy;
mod summarizer;

pub use policy::{calculate_summary_range, estimate_tokens, should_summarize};
pub use summarizer::{parse_active_threads, ContinuityPoints, SummaryDraft};

use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::{CompressionConfig, Config};
use crate::errors::{PipelineError, PipelineResult, TransportError};
use crate::generators::Generator;
use crate::parsing::{word_count, Parsed};
use crate::store::{ChapterRange, SourceRef, Store, Summary, SummarySource};
use fingerprint::{chapters_fingerprint, is_fresh, summaries_fingerprint};
use summarizer::Summarizer;

/// What a commit-time compression pass did
#[derive(Debug, Clone, Default)]
pub struct CompressionReport {
    pub invalidated: usize,
    pub chapter_summary: Option<Summary>,
    pub meta_summary: Option<Summary>,
}

/// Summaries covering a chapter range, oldest first
#[derive(Debug, Clone, Default)]
pub struct RangeContext {
    pub summaries: Vec<Summary>,
    /// Per-chapter summaries generated to fill gaps
    pub regenerated: usize,
    /// Stale summaries deleted before assembly
    pub purged: usize,
}

impl RangeContext {
    pub fn render(&self) -> String {
        self.summaries
            .iter()
            .map(|s| {
                let label = if s.range.start == s.range.end {
                    format!("Chapter {}", s.range.start)
                } else {
                    format!("Chapters {}-{}", s.range.start, s.range.end)
                };
                format!("### {label}\n{}", s.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Open threads across every covering summary, deduplicated in order
    pub fn unresolved_threads(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.summaries
            .iter()
            .flat_map(|s| s.unresolved_threads.iter())
            .filter(|t| seen.insert(t.to_ascii_lowercase()))
            .cloned()
            .collect()
    }
}

pub struct CompressionEngine {
    store: Arc<dyn Store>,
    summarizer: Summarizer,
    config: CompressionConfig,
    /// One in-flight compression operation per project
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CompressionEngine {
    pub fn new(generator: Arc<dyn Generator>, store: Arc<dyn Store>, config: &Config) -> Self {
        let summarizer = Summarizer::new(
            generator,
            config.roles.summarizer.sampling(),
            config.compression.compression_ratio,
        );
        Self {
            store,
            summarizer,
            config: config.compression.clone(),
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Threshold check against the configured context budget ratio
    pub fn should_summarize(&self, current_tokens: usize, max_tokens: usize) -> bool {
        should_summarize(current_tokens, max_tokens, self.config.context_threshold)
    }

    async fn project_lock(&self, project_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(project_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    // --- public operations (each holds the project lock) ---

    /// Push path after a chapter's content is accepted: drop summaries that
    /// cover it, summarize it, then fold old summaries if the window overflowed.
    pub async fn on_chapter_committed(&self, project_id: &str, chapter_number: u32) -> PipelineResult<CompressionReport> {
        let _guard = self.project_lock(project_id).await;

        let invalidated = self.invalidate_locked(project_id, chapter_number).await?;
        let all = self.store.list_summaries(project_id).await?;
        let chapter_summary = self.summarize_chapter_locked(project_id, chapter_number, &all).await?;
        let meta_summary = self.meta_compress_locked(project_id).await?;

        Ok(CompressionReport {
            invalidated,
            chapter_summary: Some(chapter_summary),
            meta_summary,
        })
    }

    pub async fn summarize_chapter(&self, project_id: &str, chapter_number: u32) -> PipelineResult<Summary> {
        let _guard = self.project_lock(project_id).await;
        let all = self.store.list_summaries(project_id).await?;
        self.summarize_chapter_locked(project_id, chapter_number, &all).await
    }

    /// Summarize consecutive chapters into one summary spanning `range`
    pub async fn summarize_window(&self, project_id: &str, range: ChapterRange) -> PipelineResult<Summary> {
        let _guard = self.project_lock(project_id).await;
        self.summarize_window_locked(project_id, range).await
    }

    pub async fn meta_compress(&self, project_id: &str) -> PipelineResult<Option<Summary>> {
        let _guard = self.project_lock(project_id).await;
        self.meta_compress_locked(project_id).await
    }

    /// Delete every summary whose range includes `chapter_number`
    pub async fn invalidate_chapter(&self, project_id: &str, chapter_number: u32) -> PipelineResult<usize> {
        let _guard = self.project_lock(project_id).await;
        self.invalidate_locked(project_id, chapter_number).await
    }

    /// Delete every summary whose fingerprint no longer matches current content
    pub async fn purge_stale(&self, project_id: &str) -> PipelineResult<usize> {
        let _guard = self.project_lock(project_id).await;
        self.purge_stale_locked(project_id).await
    }

    /// Fresh summaries covering `range`, regenerating per-chapter summaries
    /// for any gap. Chapters without accepted content are skipped.
    pub async fn context_for_range(&self, project_id: &str, range: ChapterRange) -> PipelineResult<RangeContext> {
        let _guard = self.project_lock(project_id).await;
        self.context_for_range_locked(project_id, range).await
    }

    /// Window summary over `range` if the covering summaries can be merged
    /// without overlapping a live summary outside it.
    pub async fn consolidate(&self, project_id: &str, range: ChapterRange) -> PipelineResult<Option<Summary>> {
        let _guard = self.project_lock(project_id).await;
        let all = self.store.list_summaries(project_id).await?;
        let straddles = all.iter().any(|s| {
            s.is_live()
                && s.range.overlaps(&range)
                && !(range.start <= s.range.start && s.range.end <= range.end)
        });
        if straddles {
            tracing::debug!(project = project_id, %range, "Live summary straddles window; skipping consolidation");
            return Ok(None);
        }
        self.summarize_window_locked(project_id, range).await.map(Some)
    }

    pub async fn live_summaries(&self, project_id: &str) -> PipelineResult<Vec<Summary>> {
        let all = self.store.list_summaries(project_id).await?;
        Ok(all.into_iter().filter(Summary::is_live).collect())
    }

    /// Pull continuity facts out of arbitrary text
    pub async fn extract_continuity(&self, text: &str) -> Result<Parsed<ContinuityPoints>, TransportError> {
        self.summarizer.continuity(text).await
    }

    // --- internals (caller holds the project lock) ---

    /// Accepted content of every chapter in `range` that has one
    async fn load_contents(&self, project_id: &str, range: Option<ChapterRange>) -> PipelineResult<BTreeMap<u32, String>> {
        let chapters = self.store.list_chapters(project_id).await?;
        let mut contents = BTreeMap::new();
        for chapter in chapters {
            if range.is_some_and(|r| !r.contains(chapter.chapter_number)) {
                continue;
            }
            if let Some(version) = self.store.accepted_content(&chapter).await? {
                contents.insert(chapter.chapter_number, version.content);
            }
        }
        Ok(contents)
    }

    /// Write `summary`, re-pointing anything the replaced row had superseded
    async fn store_summary(&self, summary: &Summary, all: &[Summary]) -> PipelineResult<()> {
        if let Some(old) = all
            .iter()
            .find(|s| s.range == summary.range && s.id != summary.id)
        {
            for dependent in all.iter().filter(|s| s.superseded_by == Some(old.id)) {
                let mut dependent = dependent.clone();
                dependent.superseded_by = Some(summary.id);
                self.store.put_summary(&dependent).await?;
            }
        }
        self.store.put_summary(summary).await?;
        Ok(())
    }

    /// Delete `doomed` and revive anything they had superseded
    async fn remove_summaries(&self, project_id: &str, doomed: &[&Summary], all: &[Summary]) -> PipelineResult<usize> {
        let ids: HashSet<Uuid> = doomed.iter().map(|s| s.id).collect();
        for summary in doomed {
            self.store.delete_summary(project_id, summary.range).await?;
        }
        for orphan in all
            .iter()
            .filter(|s| !ids.contains(&s.id) && s.superseded_by.is_some_and(|by| ids.contains(&by)))
        {
            let mut revived = orphan.clone();
            revived.superseded_by = None;
            self.store.put_summary(&revived).await?;
        }
        Ok(doomed.len())
    }

    async fn invalidate_locked(&self, project_id: &str, chapter_number: u32) -> PipelineResult<usize> {
        let all = self.store.list_summaries(project_id).await?;
        let doomed: Vec<&Summary> = all.iter().filter(|s| s.range.contains(chapter_number)).collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        let removed = self.remove_summaries(project_id, &doomed, &all).await?;
        tracing::info!(project = project_id, chapter = chapter_number, removed, "Invalidated summaries");
        Ok(removed)
    }

    async fn purge_stale_locked(&self, project_id: &str) -> PipelineResult<usize> {
        let all = self.store.list_summaries(project_id).await?;
        if all.is_empty() {
            return Ok(0);
        }
        let contents = self.load_contents(project_id, None).await?;
        let by_range: HashMap<ChapterRange, &Summary> = all.iter().map(|s| (s.range, s)).collect();
        let stale: Vec<&Summary> = all.iter().filter(|s| !is_fresh(s, &contents, &by_range)).collect();
        if stale.is_empty() {
            return Ok(0);
        }
        for s in &stale {
            tracing::warn!(project = project_id, range = %s.range, "Stale summary fingerprint; deleting");
        }
        self.remove_summaries(project_id, &stale, &all).await
    }

    async fn summarize_chapter_locked(&self, project_id: &str, chapter_number: u32, all: &[Summary]) -> PipelineResult<Summary> {
        let contents = self
            .load_contents(project_id, Some(ChapterRange::single(chapter_number)))
            .await?;
        let content = contents.get(&chapter_number).ok_or_else(|| {
            PipelineError::InvalidState(format!(
                "chapter {chapter_number} of {project_id} has no accepted content to summarize"
            ))
        })?;

        let draft = self.summarizer.chapter(chapter_number, content).await?;
        let range = ChapterRange::single(chapter_number);

        // Keep live summaries disjoint: a larger live summary already covering
        // this chapter supersedes the new one
        let covering = all
            .iter()
            .find(|s| s.is_live() && s.range != range && s.range.contains(chapter_number))
            .map(|s| s.id);

        let summary = Summary {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            range,
            fingerprint: chapters_fingerprint([(chapter_number, content.as_str())]),
            source: SummarySource::Chapters,
            source_word_count: word_count(content),
            summary_word_count: word_count(&draft.text),
            text: draft.text,
            unresolved_threads: draft.unresolved_threads,
            superseded_by: covering,
            created_at: Utc::now(),
        };
        self.store_summary(&summary, all).await?;
        tracing::info!(
            project = project_id,
            chapter = chapter_number,
            ratio = summary.compression_ratio(),
            "Chapter summarized"
        );
        Ok(summary)
    }

    async fn summarize_window_locked(&self, project_id: &str, range: ChapterRange) -> PipelineResult<Summary> {
        let contents = self.load_contents(project_id, Some(range)).await?;
        let mut chapters = Vec::with_capacity(range.len() as usize);
        for n in range.numbers() {
            let content = contents.get(&n).ok_or_else(|| {
                PipelineError::InvalidState(format!("chapter {n} of {project_id} has no accepted content"))
            })?;
            chapters.push((n, content.clone()));
        }

        let draft = self.summarizer.window(&chapters).await?;
        let summary = Summary {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            range,
            fingerprint: chapters_fingerprint(chapters.iter().map(|(n, c)| (*n, c.as_str()))),
            source: SummarySource::Chapters,
            source_word_count: chapters.iter().map(|(_, c)| word_count(c)).sum(),
            summary_word_count: word_count(&draft.text),
            text: draft.text,
            unresolved_threads: draft.unresolved_threads,
            superseded_by: None,
            created_at: Utc::now(),
        };

        let all = self.store.list_summaries(project_id).await?;
        self.store_summary(&summary, &all).await?;
        for inner in all
            .iter()
            .filter(|s| s.is_live() && s.range != range && range.start <= s.range.start && s.range.end <= range.end)
        {
            let mut inner = inner.clone();
            inner.superseded_by = Some(summary.id);
            self.store.put_summary(&inner).await?;
        }
        tracing::info!(
            project = project_id,
            %range,
            threads = summary.unresolved_threads.len(),
            "Window summarized"
        );
        Ok(summary)
    }

    async fn meta_compress_locked(&self, project_id: &str) -> PipelineResult<Option<Summary>> {
        let all = self.store.list_summaries(project_id).await?;
        let mut live: Vec<&Summary> = all.iter().filter(|s| s.is_live()).collect();
        let retained = self.config.retained_chapters;
        if live.len() <= retained + 1 {
            return Ok(None);
        }
        live.sort_by_key(|s| s.range);
        let batch = &live[..live.len() - retained];

        if batch.windows(2).any(|w| w[0].range.end + 1 != w[1].range.start) {
            tracing::debug!(project = project_id, "Oldest summaries are not contiguous; deferring meta-compression");
            return Ok(None);
        }

        let labels: Vec<String> = batch
            .iter()
            .map(|s| format!("Chapters {}-{}", s.range.start, s.range.end))
            .collect();
        let parts: Vec<(String, &str, &[String])> = batch
            .iter()
            .zip(labels)
            .map(|(s, label)| (label, s.text.as_str(), s.unresolved_threads.as_slice()))
            .collect();
        let draft = self.summarizer.meta(&parts).await?;

        let refs: Vec<SourceRef> = batch
            .iter()
            .map(|s| SourceRef {
                id: s.id,
                range: s.range,
                fingerprint: s.fingerprint.clone(),
            })
            .collect();
        let range = ChapterRange::new(batch[0].range.start, batch[batch.len() - 1].range.end);
        let meta = Summary {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            range,
            fingerprint: summaries_fingerprint(batch.iter().map(|s| s.fingerprint.as_str())),
            source: SummarySource::Summaries(refs),
            source_word_count: batch.iter().map(|s| s.source_word_count).sum(),
            summary_word_count: word_count(&draft.text),
            text: draft.text,
            unresolved_threads: draft.unresolved_threads,
            superseded_by: None,
            created_at: Utc::now(),
        };

        self.store_summary(&meta, &all).await?;
        for constituent in batch {
            let mut constituent = (*constituent).clone();
            constituent.superseded_by = Some(meta.id);
            self.store.put_summary(&constituent).await?;
        }
        tracing::info!(
            project = project_id,
            %range,
            folded = batch.len(),
            "Meta-summary created"
        );
        Ok(Some(meta))
    }

    async fn context_for_range_locked(&self, project_id: &str, range: ChapterRange) -> PipelineResult<RangeContext> {
        let purged = self.purge_stale_locked(project_id).await?;
        let mut all = self.store.list_summaries(project_id).await?;
        let contents = self.load_contents(project_id, Some(range)).await?;

        let mut summaries = Vec::new();
        let mut regenerated = 0;
        let mut cursor = range.start;
        while cursor <= range.end {
            // Live summaries win; a superseded one is used only when the live
            // summary for this position reaches past the requested range
            let best = all
                .iter()
                .filter(|s| s.range.start == cursor && s.range.end <= range.end)
                .max_by_key(|s| (s.is_live(), s.range.end))
                .cloned();

            match best {
                Some(summary) => {
                    cursor = summary.range.end + 1;
                    summaries.push(summary);
                }
                None if contents.contains_key(&cursor) => {
                    let summary = self.summarize_chapter_locked(project_id, cursor, &all).await?;
                    regenerated += 1;
                    all.retain(|s| s.range != summary.range);
                    all.push(summary.clone());
                    summaries.push(summary);
                    cursor += 1;
                }
                None => cursor += 1,
            }
        }

        Ok(RangeContext {
            summaries,
            regenerated,
            purged,
        })
    }
}
