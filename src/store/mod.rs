// Persistence for chapters, content versions, score records and summaries
//
// One `Store` trait, implemented by `SqliteStore` (durable, per-entity
// submodules) and `MemoryStore` (tests and dry runs). The pipeline and the
// compression engine only ever go through this trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::evaluator::ScoreRecord;

mod memory;
pub mod records;
mod sqlite;

pub use memory::MemoryStore;
pub use records::{
    ChapterError, ChapterRange, ChapterStatus, ChapterUnit, ContentVersion, ProducedBy, SourceRef,
    Summary, SummarySource,
};
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // --- chapters ---

    /// Insert a new chapter; fails with `AlreadyExists` for a taken `(project, number)`
    async fn create_chapter(&self, chapter: &ChapterUnit) -> StoreResult<()>;

    async fn get_chapter(&self, project_id: &str, chapter_number: u32) -> StoreResult<Option<ChapterUnit>>;

    /// Overwrite the mutable fields of an existing chapter
    async fn update_chapter(&self, chapter: &ChapterUnit) -> StoreResult<()>;

    /// Chapters of a project ordered by number
    async fn list_chapters(&self, project_id: &str) -> StoreResult<Vec<ChapterUnit>>;

    // --- content versions ---

    /// Append a snapshot. `version` must be exactly the latest + 1 (1 for the
    /// first); anything else is a `VersionConflict`.
    async fn append_version(&self, version: &ContentVersion) -> StoreResult<()>;

    async fn get_version(&self, chapter_id: Uuid, version: u32) -> StoreResult<Option<ContentVersion>>;

    /// Versions oldest first
    async fn list_versions(&self, chapter_id: Uuid) -> StoreResult<Vec<ContentVersion>>;

    // --- score records ---

    async fn append_score(&self, score: &ScoreRecord) -> StoreResult<()>;

    /// Score records in insertion order
    async fn list_scores(&self, chapter_id: Uuid) -> StoreResult<Vec<ScoreRecord>>;

    // --- summaries ---

    /// Insert or replace the summary for `(project_id, range)`
    async fn put_summary(&self, summary: &Summary) -> StoreResult<()>;

    async fn get_summary(&self, project_id: &str, range: ChapterRange) -> StoreResult<Option<Summary>>;

    /// Returns whether a row was removed
    async fn delete_summary(&self, project_id: &str, range: ChapterRange) -> StoreResult<bool>;

    /// Every summary of a project (live and superseded) ordered by range
    async fn list_summaries(&self, project_id: &str) -> StoreResult<Vec<Summary>>;

    // --- projects ---

    /// Remove all chapters, versions, scores and summaries of a project
    async fn delete_project(&self, project_id: &str) -> StoreResult<()>;

    // --- provided ---

    async fn latest_score(&self, chapter_id: Uuid) -> StoreResult<Option<ScoreRecord>> {
        Ok(self.list_scores(chapter_id).await?.pop())
    }

    /// Content of the chapter's accepted version, if it has one
    async fn accepted_content(&self, chapter: &ChapterUnit) -> StoreResult<Option<ContentVersion>> {
        if !chapter.has_content() {
            return Ok(None);
        }
        self.get_version(chapter.id, chapter.version).await
    }

    async fn require_chapter(&self, project_id: &str, chapter_number: u32) -> StoreResult<ChapterUnit> {
        self.get_chapter(project_id, chapter_number)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "chapter",
                key: format!("{project_id}/{chapter_number}"),
            })
    }
}
