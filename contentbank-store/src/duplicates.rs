use contentbank_model::{DuplicateGroupResolver, EntityId, Result};
use rusqlite::{Connection, params};

/// Strict duplicate groups: same type, same content, same content format.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactDuplicateResolver;

impl DuplicateGroupResolver for ExactDuplicateResolver {
    fn group_entity_ids(
        &self,
        conn: &Connection,
        representative: EntityId,
    ) -> Result<Vec<EntityId>> {
        let mut stmt = conn.prepare(
            "SELECT other.id FROM entities rep
             JOIN entities other
               ON other.entity_type = rep.entity_type
              AND other.content = rep.content
              AND other.content_format = rep.content_format
             WHERE rep.id = ?1
             ORDER BY other.id",
        )?;
        let ids = stmt
            .query_map(params![representative], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<EntityId>>>()?;
        Ok(ids)
    }
}
