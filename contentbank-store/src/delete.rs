use contentbank_model::{DeleteOutcome, EntityId, EntryId, Error, Result, SafeDelete};
use rusqlite::{Connection, params};
use tracing::debug;

/// Removes an entity, its version rows, and its entry once no version is left.
///
/// Refuses entities that still have attempt records.
#[derive(Debug, Default, Clone, Copy)]
pub struct CascadingDelete;

impl SafeDelete for CascadingDelete {
    fn delete(&self, conn: &Connection, entity_id: EntityId) -> Result<DeleteOutcome> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM entities WHERE id = ?1)",
            params![entity_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            debug!("Entity {} already absent", entity_id);
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        let attempts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?;
        if attempts > 0 {
            return Err(Error::InUse(format!(
                "entity {entity_id} has {attempts} attempt records"
            )));
        }

        let entry_ids = {
            let mut stmt =
                conn.prepare("SELECT DISTINCT entry_id FROM versions WHERE entity_id = ?1")?;
            stmt.query_map(params![entity_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<EntryId>>>()?
        };

        conn.execute("DELETE FROM versions WHERE entity_id = ?1", params![entity_id])?;
        for entry_id in entry_ids {
            let removed = conn.execute(
                "DELETE FROM entries WHERE id = ?1
                 AND NOT EXISTS (SELECT 1 FROM versions WHERE entry_id = ?1)",
                params![entry_id],
            )?;
            if removed > 0 {
                debug!("Removed empty entry {}", entry_id);
            }
        }
        conn.execute("DELETE FROM entities WHERE id = ?1", params![entity_id])?;

        debug!("Deleted entity {}", entity_id);
        Ok(DeleteOutcome::Deleted)
    }
}
