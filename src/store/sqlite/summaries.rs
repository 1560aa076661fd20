// Summary rows, unique per (project, range)

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_ts, parse_uuid, to_ts};
use crate::store::records::{ChapterRange, Summary};
use crate::store::StoreResult;

const COLUMNS: &str = "id, project_id, range_start, range_end, text, fingerprint, source, \
                       unresolved_threads, source_word_count, summary_word_count, superseded_by, created_at";

struct SummaryRow {
    id: String,
    project_id: String,
    start: u32,
    end: u32,
    text: String,
    fingerprint: String,
    source: String,
    unresolved_threads: String,
    source_word_count: i64,
    summary_word_count: i64,
    superseded_by: Option<String>,
    created_at: String,
}

impl SummaryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            start: row.get(2)?,
            end: row.get(3)?,
            text: row.get(4)?,
            fingerprint: row.get(5)?,
            source: row.get(6)?,
            unresolved_threads: row.get(7)?,
            source_word_count: row.get(8)?,
            summary_word_count: row.get(9)?,
            superseded_by: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_summary(self) -> StoreResult<Summary> {
        Ok(Summary {
            id: parse_uuid(&self.id)?,
            project_id: self.project_id,
            range: ChapterRange::new(self.start, self.end),
            text: self.text,
            fingerprint: self.fingerprint,
            source: serde_json::from_str(&self.source)?,
            unresolved_threads: serde_json::from_str(&self.unresolved_threads)?,
            source_word_count: self.source_word_count.max(0) as usize,
            summary_word_count: self.summary_word_count.max(0) as usize,
            superseded_by: self.superseded_by.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

/// Replace-on-range upsert
pub(super) fn put(conn: &Connection, summary: &Summary) -> StoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO summaries ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT (project_id, range_start, range_end) DO UPDATE SET
                id = excluded.id,
                text = excluded.text,
                fingerprint = excluded.fingerprint,
                source = excluded.source,
                unresolved_threads = excluded.unresolved_threads,
                source_word_count = excluded.source_word_count,
                summary_word_count = excluded.summary_word_count,
                superseded_by = excluded.superseded_by,
                created_at = excluded.created_at"
        ),
        params![
            summary.id.to_string(),
            summary.project_id,
            summary.range.start,
            summary.range.end,
            summary.text,
            summary.fingerprint,
            serde_json::to_string(&summary.source)?,
            serde_json::to_string(&summary.unresolved_threads)?,
            summary.source_word_count as i64,
            summary.summary_word_count as i64,
            summary.superseded_by.map(|id| id.to_string()),
            to_ts(&summary.created_at),
        ],
    )?;
    Ok(())
}

pub(super) fn get(conn: &Connection, project_id: &str, range: ChapterRange) -> StoreResult<Option<Summary>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM summaries
                 WHERE project_id = ?1 AND range_start = ?2 AND range_end = ?3"
            ),
            params![project_id, range.start, range.end],
            SummaryRow::from_row,
        )
        .optional()?;
    row.map(SummaryRow::into_summary).transpose()
}

pub(super) fn delete(conn: &Connection, project_id: &str, range: ChapterRange) -> StoreResult<bool> {
    let removed = conn.execute(
        "DELETE FROM summaries WHERE project_id = ?1 AND range_start = ?2 AND range_end = ?3",
        params![project_id, range.start, range.end],
    )?;
    Ok(removed > 0)
}

pub(super) fn list(conn: &Connection, project_id: &str) -> StoreResult<Vec<Summary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM summaries WHERE project_id = ?1 ORDER BY range_start ASC, range_end ASC"
    ))?;
    let rows = stmt
        .query_map(params![project_id], SummaryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(SummaryRow::into_summary).collect()
}

pub(super) fn delete_for_project(conn: &Connection, project_id: &str) -> StoreResult<usize> {
    Ok(conn.execute("DELETE FROM summaries WHERE project_id = ?1", params![project_id])?)
}
