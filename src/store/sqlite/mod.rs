// SQLite-backed store
//
// - One connection behind a tokio mutex, WAL journal
// - Each entity family lives in its own submodule of plain functions over
//   `&Connection`; this type only routes trait calls to them

mod chapters;
mod scores;
mod summaries;
mod versions;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::records::{ChapterRange, ChapterUnit, ContentVersion, Summary};
use super::{Store, StoreResult};
use crate::errors::StoreError;
use crate::evaluator::ScoreRecord;

pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn)?;
        tracing::info!("Store initialized: {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

pub(super) fn to_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(super) fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("bad timestamp {raw:?}: {e}")))
}

pub(super) fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Backend(format!("bad id {raw:?}: {e}")))
}

/// Decode a snake_case enum column through its serde representation
pub(super) fn parse_label<T: serde::de::DeserializeOwned>(raw: &str) -> StoreResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(raw.to_string()))?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_chapter(&self, chapter: &ChapterUnit) -> StoreResult<()> {
        let conn = self.db.lock().await;
        chapters::insert(&conn, chapter)
    }

    async fn get_chapter(&self, project_id: &str, chapter_number: u32) -> StoreResult<Option<ChapterUnit>> {
        let conn = self.db.lock().await;
        chapters::get(&conn, project_id, chapter_number)
    }

    async fn update_chapter(&self, chapter: &ChapterUnit) -> StoreResult<()> {
        let conn = self.db.lock().await;
        chapters::update(&conn, chapter)
    }

    async fn list_chapters(&self, project_id: &str) -> StoreResult<Vec<ChapterUnit>> {
        let conn = self.db.lock().await;
        chapters::list(&conn, project_id)
    }

    async fn append_version(&self, version: &ContentVersion) -> StoreResult<()> {
        let mut conn = self.db.lock().await;
        versions::append(&mut conn, version)
    }

    async fn get_version(&self, chapter_id: Uuid, version: u32) -> StoreResult<Option<ContentVersion>> {
        let conn = self.db.lock().await;
        versions::get(&conn, chapter_id, version)
    }

    async fn list_versions(&self, chapter_id: Uuid) -> StoreResult<Vec<ContentVersion>> {
        let conn = self.db.lock().await;
        versions::list(&conn, chapter_id)
    }

    async fn append_score(&self, score: &ScoreRecord) -> StoreResult<()> {
        let conn = self.db.lock().await;
        scores::append(&conn, score)
    }

    async fn list_scores(&self, chapter_id: Uuid) -> StoreResult<Vec<ScoreRecord>> {
        let conn = self.db.lock().await;
        scores::list(&conn, chapter_id)
    }

    async fn latest_score(&self, chapter_id: Uuid) -> StoreResult<Option<ScoreRecord>> {
        let conn = self.db.lock().await;
        scores::latest(&conn, chapter_id)
    }

    async fn put_summary(&self, summary: &Summary) -> StoreResult<()> {
        let conn = self.db.lock().await;
        summaries::put(&conn, summary)
    }

    async fn get_summary(&self, project_id: &str, range: ChapterRange) -> StoreResult<Option<Summary>> {
        let conn = self.db.lock().await;
        summaries::get(&conn, project_id, range)
    }

    async fn delete_summary(&self, project_id: &str, range: ChapterRange) -> StoreResult<bool> {
        let conn = self.db.lock().await;
        summaries::delete(&conn, project_id, range)
    }

    async fn list_summaries(&self, project_id: &str) -> StoreResult<Vec<Summary>> {
        let conn = self.db.lock().await;
        summaries::list(&conn, project_id)
    }

    async fn delete_project(&self, project_id: &str) -> StoreResult<()> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        scores::delete_for_project(&tx, project_id)?;
        versions::delete_for_project(&tx, project_id)?;
        summaries::delete_for_project(&tx, project_id)?;
        let removed = chapters::delete_for_project(&tx, project_id)?;
        tx.commit()?;
        tracing::info!(project = project_id, chapters = removed, "Project deleted");
        Ok(())
    }
}
