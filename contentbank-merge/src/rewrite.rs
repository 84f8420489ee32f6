//! Reference rewrite statements.
//!
//! Plain tables get one `UPDATE` per mapping pair. Reference-role tables are
//! rewritten row by row: a row whose usage key already exists for the new
//! entry is deleted, any other row is moved to the new entry with its version
//! pin cleared so it re-resolves to the latest usable version.

use crate::catalog::SchemaSnapshot;
use crate::config::DiscoveryPolicy;
use contentbank_model::ReferenceTarget;
use contentbank_store::quote_ident;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use tracing::debug;

/// `UPDATE table SET column = new WHERE column = old` for every pair.
pub fn rewrite_plain(
    conn: &Connection,
    target: &ReferenceTarget,
    pairs: &[(i64, i64)],
) -> rusqlite::Result<u64> {
    let sql = format!(
        "UPDATE {table} SET {column} = ?1 WHERE {column} = ?2",
        table = quote_ident(&target.table),
        column = quote_ident(&target.column),
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut touched = 0;
    for (old, new) in pairs {
        touched += stmt.execute(params![new, old])? as u64;
    }
    Ok(touched)
}

/// Rewrites an entry column of a reference-role table, deduplicating on the
/// policy's key columns when the table has them.
pub fn rewrite_reference(
    conn: &Connection,
    target: &ReferenceTarget,
    pairs: &[(i64, i64)],
    snapshot: &SchemaSnapshot,
    policy: &DiscoveryPolicy,
) -> rusqlite::Result<u64> {
    let key_columns: Vec<&str> = policy
        .reference_key_columns
        .iter()
        .map(String::as_str)
        .filter(|c| snapshot.has_column(&target.table, c))
        .collect();
    let pin_reset: String = policy
        .version_pin_columns
        .iter()
        .filter(|c| snapshot.has_column(&target.table, c))
        .map(|c| format!(", {} = NULL", quote_ident(c)))
        .collect();
    let row_key = if snapshot.has_column(&target.table, "id") {
        "id"
    } else {
        "rowid"
    };

    let table = quote_ident(&target.table);
    let column = quote_ident(&target.column);

    if key_columns.is_empty() {
        debug!(
            "{} has no usage key columns; rewriting without dedup",
            target.table
        );
        let sql = format!("UPDATE {table} SET {column} = ?1{pin_reset} WHERE {column} = ?2");
        let mut touched = 0;
        for (old, new) in pairs {
            touched += conn.execute(&sql, params![new, old])? as u64;
        }
        return Ok(touched);
    }

    let key_list = key_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let matcher = key_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} IS ?{}", quote_ident(c), i + 2))
        .collect::<Vec<_>>()
        .join(" AND ");

    let select_sql = format!("SELECT {row_key}, {key_list} FROM {table} WHERE {column} = ?1");
    let exists_sql =
        format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE {column} = ?1 AND {matcher})");
    let delete_sql = format!("DELETE FROM {table} WHERE {row_key} = ?1");
    let update_sql = format!("UPDATE {table} SET {column} = ?1{pin_reset} WHERE {row_key} = ?2");

    let mut touched = 0;
    for (old, new) in pairs {
        let rows: Vec<(i64, Vec<Value>)> = {
            let mut stmt = conn.prepare(&select_sql)?;
            stmt.query_map(params![old], |row| {
                let mut keys = Vec::with_capacity(key_columns.len());
                for i in 0..key_columns.len() {
                    keys.push(row.get::<_, Value>(i + 1)?);
                }
                Ok((row.get::<_, i64>(0)?, keys))
            })?
            .collect::<rusqlite::Result<_>>()?
        };

        for (row_id, keys) in rows {
            let mut args = Vec::with_capacity(keys.len() + 1);
            args.push(Value::Integer(*new));
            args.extend(keys);
            let exists: i64 =
                conn.query_row(&exists_sql, params_from_iter(args.iter()), |row| row.get(0))?;
            if exists == 1 {
                conn.execute(&delete_sql, params![row_id])?;
                debug!(
                    "Dropped {} row {}: usage already exists for entry {}",
                    target.table, row_id, new
                );
            } else {
                conn.execute(&update_sql, params![new, row_id])?;
            }
            touched += 1;
        }
    }
    Ok(touched)
}
