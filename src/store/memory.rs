// In-process store for tests and dry runs

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::records::{ChapterRange, ChapterUnit, ContentVersion, Summary};
use super::{Store, StoreResult};
use crate::errors::StoreError;
use crate::evaluator::ScoreRecord;

#[derive(Default)]
struct State {
    chapters: BTreeMap<(String, u32), ChapterUnit>,
    versions: HashMap<Uuid, Vec<ContentVersion>>,
    scores: HashMap<Uuid, Vec<ScoreRecord>>,
    summaries: HashMap<String, BTreeMap<ChapterRange, Summary>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_chapter(&self, chapter: &ChapterUnit) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let key = (chapter.project_id.clone(), chapter.chapter_number);
        if state.chapters.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                entity: "chapter",
                key: chapter.key(),
            });
        }
        state.chapters.insert(key, chapter.clone());
        Ok(())
    }

    async fn get_chapter(&self, project_id: &str, chapter_number: u32) -> StoreResult<Option<ChapterUnit>> {
        let state = self.state.read().await;
        Ok(state
            .chapters
            .get(&(project_id.to_string(), chapter_number))
            .cloned())
    }

    async fn update_chapter(&self, chapter: &ChapterUnit) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state
            .chapters
            .get_mut(&(chapter.project_id.clone(), chapter.chapter_number))
        {
            Some(existing) if existing.id == chapter.id => {
                *existing = chapter.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound {
                entity: "chapter",
                key: chapter.key(),
            }),
        }
    }

    async fn list_chapters(&self, project_id: &str) -> StoreResult<Vec<ChapterUnit>> {
        let state = self.state.read().await;
        Ok(state
            .chapters
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn append_version(&self, version: &ContentVersion) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let versions = state.versions.entry(version.chapter_id).or_default();
        let expected = versions.last().map(|v| v.version).unwrap_or(0) + 1;
        if version.version != expected {
            return Err(StoreError::VersionConflict {
                chapter_id: version.chapter_id.to_string(),
                expected,
                actual: version.version,
            });
        }
        versions.push(version.clone());
        Ok(())
    }

    async fn get_version(&self, chapter_id: Uuid, version: u32) -> StoreResult<Option<ContentVersion>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .get(&chapter_id)
            .and_then(|vs| vs.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn list_versions(&self, chapter_id: Uuid) -> StoreResult<Vec<ContentVersion>> {
        let state = self.state.read().await;
        Ok(state.versions.get(&chapter_id).cloned().unwrap_or_default())
    }

    async fn append_score(&self, score: &ScoreRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .scores
            .entry(score.chapter_id)
            .or_default()
            .push(score.clone());
        Ok(())
    }

    async fn list_scores(&self, chapter_id: Uuid) -> StoreResult<Vec<ScoreRecord>> {
        let state = self.state.read().await;
        Ok(state.scores.get(&chapter_id).cloned().unwrap_or_default())
    }

    async fn put_summary(&self, summary: &Summary) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .summaries
            .entry(summary.project_id.clone())
            .or_default()
            .insert(summary.range, summary.clone());
        Ok(())
    }

    async fn get_summary(&self, project_id: &str, range: ChapterRange) -> StoreResult<Option<Summary>> {
        let state = self.state.read().await;
        Ok(state
            .summaries
            .get(project_id)
            .and_then(|m| m.get(&range))
            .cloned())
    }

    async fn delete_summary(&self, project_id: &str, range: ChapterRange) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .summaries
            .get_mut(project_id)
            .and_then(|m| m.remove(&range))
            .is_some())
    }

    async fn list_summaries(&self, project_id: &str) -> StoreResult<Vec<Summary>> {
        let state = self.state.read().await;
        Ok(state
            .summaries
            .get(project_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_project(&self, project_id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let ids: Vec<Uuid> = state
            .chapters
            .values()
            .filter(|c| c.project_id == project_id)
            .map(|c| c.id)
            .collect();
        state.chapters.retain(|(p, _), _| p != project_id);
        for id in ids {
            state.versions.remove(&id);
            state.scores.remove(&id);
        }
        state.summaries.remove(project_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Priority;
    use crate::store::records::{ProducedBy, SummarySource};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn summary(project: &str, start: u32, end: u32, text: &str) -> Summary {
        Summary {
            id: Uuid::new_v4(),
            project_id: project.into(),
            range: ChapterRange::new(start, end),
            text: text.into(),
            fingerprint: format!("fp-{text}"),
            source: SummarySource::Chapters,
            unresolved_threads: vec![],
            source_word_count: 100,
            summary_word_count: 10,
            superseded_by: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_chapter_rejected() {
        let store = MemoryStore::new();
        store.create_chapter(&ChapterUnit::new("p", 1, "o", 100)).await.unwrap();
        let err = store
            .create_chapter(&ChapterUnit::new("p", 1, "o", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_versions_must_be_contiguous() {
        let store = MemoryStore::new();
        let ch = ChapterUnit::new("p", 1, "o", 100);
        store.append_version(&ContentVersion::new(ch.id, 1, "a", ProducedBy::Drafter)).await.unwrap();

        let err = store
            .append_version(&ContentVersion::new(ch.id, 3, "c", ProducedBy::Reviser))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 2, actual: 3, .. }));

        store.append_version(&ContentVersion::new(ch.id, 2, "b", ProducedBy::Reviser)).await.unwrap();
        assert_eq!(store.list_versions(ch.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_summary_replaces_same_range() {
        let store = MemoryStore::new();
        store.put_summary(&summary("p", 1, 3, "first")).await.unwrap();
        store.put_summary(&summary("p", 1, 3, "second")).await.unwrap();
        store.put_summary(&summary("p", 4, 4, "other")).await.unwrap();

        let all = store.list_summaries("p").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "second");
        assert!(store.delete_summary("p", ChapterRange::new(1, 3)).await.unwrap());
        assert!(!store.delete_summary("p", ChapterRange::new(1, 3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_project_is_scoped() {
        let store = MemoryStore::new();
        let a = ChapterUnit::new("a", 1, "o", 100);
        let b = ChapterUnit::new("b", 1, "o", 100);
        store.create_chapter(&a).await.unwrap();
        store.create_chapter(&b).await.unwrap();
        store.append_version(&ContentVersion::new(a.id, 1, "x", ProducedBy::Drafter)).await.unwrap();
        store
            .append_score(&ScoreRecord::new(a.id, 1, BTreeMap::new(), 8.0, false, Priority::None))
            .await
            .unwrap();
        store.put_summary(&summary("a", 1, 1, "s")).await.unwrap();

        store.delete_project("a").await.unwrap();

        assert!(store.get_chapter("a", 1).await.unwrap().is_none());
        assert!(store.list_versions(a.id).await.unwrap().is_empty());
        assert!(store.latest_score(a.id).await.unwrap().is_none());
        assert!(store.list_summaries("a").await.unwrap().is_empty());
        assert!(store.get_chapter("b", 1).await.unwrap().is_some());
    }
}
