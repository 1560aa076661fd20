// Chapter rows

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{parse_label, parse_ts, parse_uuid, to_ts};
use crate::errors::StoreError;
use crate::store::records::{ChapterError, ChapterUnit};
use crate::store::StoreResult;

const COLUMNS: &str = "id, project_id, chapter_number, title, outline, target_word_count, \
                       status, word_count, version, needs_review, last_error, created_at, updated_at";

struct ChapterRow {
    id: String,
    project_id: String,
    chapter_number: u32,
    title: Option<String>,
    outline: String,
    target_word_count: i64,
    status: String,
    word_count: i64,
    version: u32,
    needs_review: bool,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ChapterRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            chapter_number: row.get(2)?,
            title: row.get(3)?,
            outline: row.get(4)?,
            target_word_count: row.get(5)?,
            status: row.get(6)?,
            word_count: row.get(7)?,
            version: row.get(8)?,
            needs_review: row.get(9)?,
            last_error: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_chapter(self) -> StoreResult<ChapterUnit> {
        let last_error = match self.last_error {
            Some(raw) => Some(serde_json::from_str::<ChapterError>(&raw)?),
            None => None,
        };
        Ok(ChapterUnit {
            id: parse_uuid(&self.id)?,
            project_id: self.project_id,
            chapter_number: self.chapter_number,
            title: self.title,
            outline: self.outline,
            target_word_count: self.target_word_count.max(0) as usize,
            status: parse_label(&self.status)?,
            word_count: self.word_count.max(0) as usize,
            version: self.version,
            needs_review: self.needs_review,
            last_error,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn encode_error(chapter: &ChapterUnit) -> StoreResult<Option<String>> {
    Ok(match &chapter.last_error {
        Some(e) => Some(serde_json::to_string(e)?),
        None => None,
    })
}

pub(super) fn insert(conn: &Connection, chapter: &ChapterUnit) -> StoreResult<()> {
    let result = conn.execute(
        &format!("INSERT INTO chapters ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
        params![
            chapter.id.to_string(),
            chapter.project_id,
            chapter.chapter_number,
            chapter.title,
            chapter.outline,
            chapter.target_word_count as i64,
            chapter.status.as_str(),
            chapter.word_count as i64,
            chapter.version,
            chapter.needs_review,
            encode_error(chapter)?,
            to_ts(&chapter.created_at),
            to_ts(&chapter.updated_at),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::AlreadyExists {
                entity: "chapter",
                key: chapter.key(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub(super) fn get(conn: &Connection, project_id: &str, chapter_number: u32) -> StoreResult<Option<ChapterUnit>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM chapters WHERE project_id = ?1 AND chapter_number = ?2"),
            params![project_id, chapter_number],
            ChapterRow::from_row,
        )
        .optional()?;
    row.map(ChapterRow::into_chapter).transpose()
}

pub(super) fn update(conn: &Connection, chapter: &ChapterUnit) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE chapters SET title = ?2, outline = ?3, target_word_count = ?4, status = ?5,
                word_count = ?6, version = ?7, needs_review = ?8, last_error = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            chapter.id.to_string(),
            chapter.title,
            chapter.outline,
            chapter.target_word_count as i64,
            chapter.status.as_str(),
            chapter.word_count as i64,
            chapter.version,
            chapter.needs_review,
            encode_error(chapter)?,
            to_ts(&chapter.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "chapter",
            key: chapter.key(),
        });
    }
    Ok(())
}

pub(super) fn list(conn: &Connection, project_id: &str) -> StoreResult<Vec<ChapterUnit>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM chapters WHERE project_id = ?1 ORDER BY chapter_number ASC"
    ))?;
    let rows = stmt
        .query_map(params![project_id], ChapterRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(ChapterRow::into_chapter).collect()
}

pub(super) fn delete_for_project(conn: &Connection, project_id: &str) -> StoreResult<usize> {
    Ok(conn.execute("DELETE FROM chapters WHERE project_id = ?1", params![project_id])?)
}
