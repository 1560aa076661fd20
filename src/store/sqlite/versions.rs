// Content version rows (append-only)

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_label, parse_ts, parse_uuid, to_ts};
use crate::errors::StoreError;
use crate::store::records::ContentVersion;
use crate::store::StoreResult;

type VersionRow = (String, u32, String, String, String, String);

fn from_row(row: &Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_version(row: VersionRow) -> StoreResult<ContentVersion> {
    let (chapter_id, version, content, produced_by, metadata, created_at) = row;
    Ok(ContentVersion {
        chapter_id: parse_uuid(&chapter_id)?,
        version,
        content,
        produced_by: parse_label(&produced_by)?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: parse_ts(&created_at)?,
    })
}

/// Insert `version` if and only if it directly follows the latest stored version
pub(super) fn append(conn: &mut Connection, version: &ContentVersion) -> StoreResult<()> {
    let tx = conn.transaction()?;
    let latest: u32 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM content_versions WHERE chapter_id = ?1",
        params![version.chapter_id.to_string()],
        |row| row.get(0),
    )?;
    let expected = latest + 1;
    if version.version != expected {
        return Err(StoreError::VersionConflict {
            chapter_id: version.chapter_id.to_string(),
            expected,
            actual: version.version,
        });
    }
    tx.execute(
        "INSERT INTO content_versions (chapter_id, version, content, produced_by, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            version.chapter_id.to_string(),
            version.version,
            version.content,
            version.produced_by.as_str(),
            serde_json::to_string(&version.metadata)?,
            to_ts(&version.created_at),
        ],
    )?;
    tx.commit()?;
    Ok(())
}

pub(super) fn get(conn: &Connection, chapter_id: Uuid, version: u32) -> StoreResult<Option<ContentVersion>> {
    let row = conn
        .query_row(
            "SELECT chapter_id, version, content, produced_by, metadata, created_at
             FROM content_versions WHERE chapter_id = ?1 AND version = ?2",
            params![chapter_id.to_string(), version],
            from_row,
        )
        .optional()?;
    row.map(into_version).transpose()
}

pub(super) fn list(conn: &Connection, chapter_id: Uuid) -> StoreResult<Vec<ContentVersion>> {
    let mut stmt = conn.prepare(
        "SELECT chapter_id, version, content, produced_by, metadata, created_at
         FROM content_versions WHERE chapter_id = ?1 ORDER BY version ASC",
    )?;
    let rows = stmt
        .query_map(params![chapter_id.to_string()], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(into_version).collect()
}

pub(super) fn delete_for_project(conn: &Connection, project_id: &str) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM content_versions
         WHERE chapter_id IN (SELECT id FROM chapters WHERE project_id = ?1)",
        params![project_id],
    )?)
}
