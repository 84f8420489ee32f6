use crate::schema::placeholders;
use contentbank_model::{EntityId, EntryId, Result, UsageCounter};
use rusqlite::{Connection, params_from_iter};
use std::collections::BTreeMap;

/// Counts attempts and assembly slots straight from the content tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteUsageCounter;

impl UsageCounter for SqliteUsageCounter {
    fn attempt_counts(
        &self,
        conn: &Connection,
        entry_ids: &[EntryId],
    ) -> Result<BTreeMap<EntryId, u64>> {
        if entry_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        // Any version's attempts count towards the whole entry.
        let sql = format!(
            "SELECT v.entry_id, COUNT(a.id) FROM attempts a
             JOIN versions v ON v.entity_id = a.entity_id
             WHERE v.entry_id IN ({})
             GROUP BY v.entry_id",
            placeholders(entry_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(entry_ids.iter()), |row| {
                Ok((row.get::<_, EntryId>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|(id, count)| (id, count.max(0) as u64))
            .collect())
    }

    fn secondary_usage(
        &self,
        conn: &Connection,
        entity_ids: &[EntityId],
    ) -> Result<BTreeMap<EntityId, u64>> {
        if entity_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let sql = format!(
            "SELECT entity_id, COUNT(*) FROM assembly_slots
             WHERE entity_id IN ({})
             GROUP BY entity_id",
            placeholders(entity_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(entity_ids.iter()), |row| {
                Ok((row.get::<_, EntityId>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|(id, count)| (id, count.max(0) as u64))
            .collect())
    }
}
