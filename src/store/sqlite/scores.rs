// Score record rows (append-only history)
//
// The headline fields are stored as columns for other readers; the full
// record round-trips through the `record` JSON column.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::to_ts;
use crate::evaluator::ScoreRecord;
use crate::store::StoreResult;

pub(super) fn append(conn: &Connection, score: &ScoreRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO score_records
            (id, chapter_id, version, overall_score, requires_revision, priority, record, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            score.id.to_string(),
            score.chapter_id.to_string(),
            score.version,
            score.overall_score,
            score.requires_revision,
            score.priority.as_str(),
            serde_json::to_string(score)?,
            to_ts(&score.created_at),
        ],
    )?;
    Ok(())
}

pub(super) fn list(conn: &Connection, chapter_id: Uuid) -> StoreResult<Vec<ScoreRecord>> {
    let mut stmt = conn.prepare("SELECT record FROM score_records WHERE chapter_id = ?1 ORDER BY seq ASC")?;
    let rows: Vec<String> = stmt
        .query_map(params![chapter_id.to_string()], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.iter()
        .map(|raw| -> StoreResult<ScoreRecord> { Ok(serde_json::from_str(raw)?) })
        .collect()
}

pub(super) fn latest(conn: &Connection, chapter_id: Uuid) -> StoreResult<Option<ScoreRecord>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT record FROM score_records WHERE chapter_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![chapter_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub(super) fn delete_for_project(conn: &Connection, project_id: &str) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM score_records
         WHERE chapter_id IN (SELECT id FROM chapters WHERE project_id = ?1)",
        params![project_id],
    )?)
}
