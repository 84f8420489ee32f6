//! Readers for the content tables.
//!
//! Free functions over a borrowed connection so they can run inside a caller's
//! transaction as well as on a plain connection.

use contentbank_model::{Entity, EntityId, Entry, EntryId, Result, Version, VersionId, VersionStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

type RawVersion = (VersionId, EntryId, EntityId, i64, Option<String>);

fn version_columns(with_status: bool) -> &'static str {
    if with_status {
        "id, entry_id, entity_id, version, status"
    } else {
        "id, entry_id, entity_id, version, NULL"
    }
}

fn read_raw_version(row: &Row<'_>) -> rusqlite::Result<RawVersion> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_version(raw: RawVersion) -> Result<Version> {
    let (id, entry_id, entity_id, version, status) = raw;
    let status = match status {
        Some(s) => s.parse()?,
        None => VersionStatus::Ready,
    };
    Ok(Version {
        id,
        entry_id,
        entity_id,
        version,
        status,
    })
}

/// The version row binding `entity_id` to its entry.
///
/// `with_status` is false on schemas without a status column; every version
/// then reads as ready.
pub fn version_for_entity(
    conn: &Connection,
    entity_id: EntityId,
    with_status: bool,
) -> Result<Option<Version>> {
    let sql = format!(
        "SELECT {} FROM versions WHERE entity_id = ?1 ORDER BY id LIMIT 1",
        version_columns(with_status)
    );
    let raw = conn
        .query_row(&sql, params![entity_id], read_raw_version)
        .optional()?;
    raw.map(into_version).transpose()
}

/// All versions of an entry, newest first.
pub fn versions_of_entry(
    conn: &Connection,
    entry_id: EntryId,
    with_status: bool,
) -> Result<Vec<Version>> {
    let sql = format!(
        "SELECT {} FROM versions WHERE entry_id = ?1 ORDER BY version DESC",
        version_columns(with_status)
    );
    let mut stmt = conn.prepare(&sql)?;
    let raws = stmt
        .query_map(params![entry_id], read_raw_version)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(into_version).collect()
}

pub fn get_entity(conn: &Connection, id: EntityId) -> Result<Option<Entity>> {
    let entity = conn
        .query_row(
            "SELECT id, entity_type, name, content, content_format, created_at
             FROM entities WHERE id = ?1",
            params![id],
            |row| {
                Ok(Entity {
                    id: row.get(0)?,
                    entity_type: row.get(1)?,
                    name: row.get(2)?,
                    content: row.get(3)?,
                    content_format: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(entity)
}

pub fn get_entry(conn: &Connection, id: EntryId) -> Result<Option<Entry>> {
    let entry = conn
        .query_row(
            "SELECT id, category_id, context_id FROM entries WHERE id = ?1",
            params![id],
            |row| {
                Ok(Entry {
                    id: row.get(0)?,
                    category_id: row.get(1)?,
                    context_id: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}
