//! Impact calculator: rows still pointing at ids that a merge removes.
//!
//! Runs before the rewrite (informational) and after it (enforcement).

use crate::error::MergeResult;
use contentbank_model::{IdMappings, Impact, ReferenceTarget};
use contentbank_store::{placeholders, quote_ident};
use rusqlite::{Connection, params_from_iter};

/// Counts, per target, the rows whose column holds an old id of that target's kind.
pub fn compute_impacts(
    conn: &Connection,
    targets: &[ReferenceTarget],
    mappings: &IdMappings,
) -> MergeResult<Vec<Impact>> {
    targets
        .iter()
        .map(|target| {
            let old_ids = mappings.old_ids(target.kind);
            let count = count_references(conn, target, &old_ids)?;
            Ok(Impact {
                table: target.table.clone(),
                column: target.column.clone(),
                kind: target.kind,
                count,
            })
        })
        .collect()
}

fn count_references(conn: &Connection, target: &ReferenceTarget, old_ids: &[i64]) -> MergeResult<u64> {
    if old_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} IN ({})",
        quote_ident(&target.table),
        quote_ident(&target.column),
        placeholders(old_ids.len())
    );
    let count: i64 = conn.query_row(&sql, params_from_iter(old_ids.iter()), |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

/// Impacts with a non-zero count.
pub fn leftovers(impacts: &[Impact]) -> impl Iterator<Item = &Impact> {
    impacts.iter().filter(|i| i.count > 0)
}
