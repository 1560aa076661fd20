// Integration tests for hierarchical context compression

mod common;

use anyhow::Result;
use std::sync::Arc;

use common::{test_config, ScriptedGenerator};
use quill::compression::CompressionEngine;
use quill::config::Config;
use quill::generators::AgentRole;
use quill::store::{ChapterRange, ChapterStatus, ChapterUnit, ContentVersion, MemoryStore, ProducedBy, Store, SummarySource};

const PROJECT: &str = "saga";

struct Fixture {
    engine: CompressionEngine,
    store: Arc<MemoryStore>,
    generator: Arc<ScriptedGenerator>,
}

fn fixture(config: Config) -> Fixture {
    let generator = Arc::new(ScriptedGenerator::new());
    let store = Arc::new(MemoryStore::new());
    let engine = CompressionEngine::new(generator.clone(), store.clone(), &config);
    Fixture {
        engine,
        store,
        generator,
    }
}

/// Accept `content` as the next version of chapter `n`, creating it if needed
async fn commit(store: &MemoryStore, n: u32, content: &str) -> Result<ChapterUnit> {
    let mut chapter = match store.get_chapter(PROJECT, n).await? {
        Some(chapter) => chapter,
        None => {
            let chapter = ChapterUnit::new(PROJECT, n, format!("outline {n}"), 1000);
            store.create_chapter(&chapter).await?;
            chapter
        }
    };
    let version = ContentVersion::new(chapter.id, chapter.version + 1, content, ProducedBy::Manual);
    store.append_version(&version).await?;
    chapter.version += 1;
    chapter.status = ChapterStatus::Completed;
    store.update_chapter(&chapter).await?;
    Ok(chapter)
}

fn ranges(summaries: &[quill::store::Summary]) -> Vec<(u32, u32)> {
    summaries.iter().map(|s| (s.range.start, s.range.end)).collect()
}

#[tokio::test]
async fn test_window_fingerprint_changes_with_content() -> Result<()> {
    let f = fixture(test_config());
    for n in 1..=3 {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
    }
    let range = ChapterRange::new(1, 3);
    let first = f.engine.summarize_window(PROJECT, range).await?;

    commit(&f.store, 2, "Chapter 2 rewritten from scratch.").await?;
    assert_eq!(f.engine.purge_stale(PROJECT).await?, 1);
    assert!(f.store.get_summary(PROJECT, range).await?.is_none());

    let second = f.engine.summarize_window(PROJECT, range).await?;
    assert_ne!(first.fingerprint, second.fingerprint);
    assert_eq!(f.engine.purge_stale(PROJECT).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_commit_folds_oldest_summaries_into_meta() -> Result<()> {
    let mut config = test_config();
    config.compression.retained_chapters = 1;
    let f = fixture(config);

    for n in 1..=2 {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
        let report = f.engine.on_chapter_committed(PROJECT, n).await?;
        assert!(report.meta_summary.is_none());
    }
    commit(&f.store, 3, "Chapter 3 text.").await?;
    let report = f.engine.on_chapter_committed(PROJECT, 3).await?;

    let meta = report.meta_summary.expect("third summary overflows the window");
    assert_eq!(meta.range, ChapterRange::new(1, 2));
    assert!(meta.is_meta());
    match &meta.source {
        SummarySource::Summaries(refs) => {
            assert_eq!(refs.len(), 2);
            assert_eq!(refs[0].range, ChapterRange::single(1));
        }
        SummarySource::Chapters => panic!("meta-summary must reference summaries"),
    }
    assert!(!meta.unresolved_threads.is_empty());

    let live = f.engine.live_summaries(PROJECT).await?;
    assert_eq!(ranges(&live), vec![(1, 2), (3, 3)]);
    // Constituents are kept but superseded
    let folded = f.store.get_summary(PROJECT, ChapterRange::single(1)).await?.unwrap();
    assert_eq!(folded.superseded_by, Some(meta.id));
    Ok(())
}

#[tokio::test]
async fn test_invalidation_removes_covering_summaries_and_revives_children() -> Result<()> {
    let mut config = test_config();
    config.compression.retained_chapters = 1;
    let f = fixture(config);
    for n in 1..=3 {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
        f.engine.on_chapter_committed(PROJECT, n).await?;
    }

    let removed = f.engine.invalidate_chapter(PROJECT, 2).await?;

    assert_eq!(removed, 2); // [2] and the meta-summary [1, 2]
    let live = f.engine.live_summaries(PROJECT).await?;
    assert_eq!(ranges(&live), vec![(1, 1), (3, 3)]);
    Ok(())
}

#[tokio::test]
async fn test_recommit_replaces_only_affected_summaries() -> Result<()> {
    let f = fixture(test_config());
    for n in 1..=3 {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
        f.engine.on_chapter_committed(PROJECT, n).await?;
    }
    let before = f.store.get_summary(PROJECT, ChapterRange::single(1)).await?.unwrap();
    let old_two = f.store.get_summary(PROJECT, ChapterRange::single(2)).await?.unwrap();

    commit(&f.store, 2, "Chapter 2, second draft.").await?;
    let report = f.engine.on_chapter_committed(PROJECT, 2).await?;

    assert_eq!(report.invalidated, 1);
    let new_two = report.chapter_summary.unwrap();
    assert_ne!(new_two.fingerprint, old_two.fingerprint);
    let after = f.store.get_summary(PROJECT, ChapterRange::single(1)).await?.unwrap();
    assert_eq!(before.id, after.id);
    Ok(())
}

#[tokio::test]
async fn test_stale_meta_summary_is_purged_recursively() -> Result<()> {
    let mut config = test_config();
    config.compression.retained_chapters = 1;
    let f = fixture(config);
    for n in 1..=3 {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
        f.engine.on_chapter_committed(PROJECT, n).await?;
    }

    // Content changes behind the engine's back
    commit(&f.store, 1, "Chapter 1 changed silently.").await?;
    let purged = f.engine.purge_stale(PROJECT).await?;

    assert_eq!(purged, 2); // [1] and the meta-summary [1, 2]
    let live = f.engine.live_summaries(PROJECT).await?;
    assert_eq!(ranges(&live), vec![(2, 2), (3, 3)]);
    Ok(())
}

#[tokio::test]
async fn test_context_for_range_regenerates_missing_summaries() -> Result<()> {
    let f = fixture(test_config());
    for n in [1, 2, 4] {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
    }

    let context = f.engine.context_for_range(PROJECT, ChapterRange::new(1, 4)).await?;

    // Chapter 3 has no content and is skipped
    assert_eq!(ranges(&context.summaries), vec![(1, 1), (2, 2), (4, 4)]);
    assert_eq!(context.regenerated, 3);
    assert_eq!(f.generator.calls(AgentRole::Summarizer), 3);

    // Second call reuses what was stored
    let again = f.engine.context_for_range(PROJECT, ChapterRange::new(1, 4)).await?;
    assert_eq!(again.regenerated, 0);
    assert_eq!(f.generator.calls(AgentRole::Summarizer), 3);
    Ok(())
}

#[tokio::test]
async fn test_context_prefers_summary_inside_range() -> Result<()> {
    let mut config = test_config();
    config.compression.retained_chapters = 1;
    let f = fixture(config);
    for n in 1..=4 {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
        f.engine.on_chapter_committed(PROJECT, n).await?;
    }
    // Live: [1, 3] meta, [4]
    let live = f.engine.live_summaries(PROJECT).await?;
    assert_eq!(ranges(&live), vec![(1, 3), (4, 4)]);

    // [1, 3] overshoots [1, 2]; the superseded [1, 2] meta fits exactly
    let context = f.engine.context_for_range(PROJECT, ChapterRange::new(1, 2)).await?;
    assert_eq!(ranges(&context.summaries), vec![(1, 2)]);
    assert_eq!(context.regenerated, 0);
    Ok(())
}

#[tokio::test]
async fn test_consolidate_skips_straddling_summary() -> Result<()> {
    let mut config = test_config();
    config.compression.retained_chapters = 1;
    let f = fixture(config);
    for n in 1..=3 {
        commit(&f.store, n, &format!("Chapter {n} text.")).await?;
        f.engine.on_chapter_committed(PROJECT, n).await?;
    }

    // Live [1, 2] crosses the boundary of [2, 3]
    assert!(f.engine.consolidate(PROJECT, ChapterRange::new(2, 3)).await?.is_none());

    let window = f
        .engine
        .consolidate(PROJECT, ChapterRange::new(1, 3))
        .await?
        .expect("range covers every live summary it touches");
    let live = f.engine.live_summaries(PROJECT).await?;
    assert_eq!(ranges(&live), vec![(1, 3)]);
    assert_eq!(live[0].id, window.id);
    Ok(())
}

#[tokio::test]
async fn test_extract_continuity_parses_json() -> Result<()> {
    let f = fixture(test_config());
    f.generator.push(
        AgentRole::Summarizer,
        Ok(r#"{"characters_introduced": ["Mara"], "locations": ["the keep"], "unresolved_threads": ["the gate"]}"#.into()),
    );

    let points = f
        .engine
        .extract_continuity("Mara reached the keep.")
        .await?
        .ok()
        .expect("valid JSON parses");
    assert_eq!(points.characters_introduced, vec!["Mara"]);
    assert_eq!(points.locations, vec!["the keep"]);
    assert!(points.rules_established.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_summarizer_failure_propagates_and_stores_nothing() -> Result<()> {
    let f = fixture(test_config());
    commit(&f.store, 1, "Chapter 1 text.").await?;
    f.generator.push(
        AgentRole::Summarizer,
        Err(quill::errors::TransportError::Timeout(30)),
    );

    assert!(f.engine.on_chapter_committed(PROJECT, 1).await.is_err());
    assert!(f.store.list_summaries(PROJECT).await?.is_empty());
    Ok(())
}
