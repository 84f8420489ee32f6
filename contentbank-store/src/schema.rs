//! Content bank DDL and live-schema introspection.

use contentbank_model::{Result, SchemaIntrospector};
use rusqlite::Connection;
use std::collections::BTreeSet;

pub(crate) const CONTENT_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        context_id INTEGER NOT NULL,
        parent_id INTEGER
    );

    CREATE TABLE IF NOT EXISTS entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        content TEXT NOT NULL,
        content_format TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category_id INTEGER NOT NULL,
        context_id INTEGER NOT NULL,
        id_number TEXT
    );

    CREATE TABLE IF NOT EXISTS versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entry_id INTEGER NOT NULL,
        entity_id INTEGER NOT NULL,
        version INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'ready',
        UNIQUE(entry_id, version)
    );
    CREATE INDEX IF NOT EXISTS idx_versions_entity ON versions(entity_id);

    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id INTEGER NOT NULL,
        outcome TEXT NOT NULL,
        attempted_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_attempts_entity ON attempts(entity_id);

    CREATE TABLE IF NOT EXISTS assembly_slots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        assembly_id INTEGER NOT NULL,
        slot INTEGER NOT NULL,
        entity_id INTEGER,
        entry_id INTEGER
    );

    CREATE TABLE IF NOT EXISTS entry_references (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        context_id INTEGER NOT NULL,
        component TEXT NOT NULL,
        area TEXT NOT NULL,
        item_id INTEGER NOT NULL,
        entry_id INTEGER NOT NULL,
        pinned_version INTEGER,
        UNIQUE(context_id, component, area, item_id, entry_id)
    );

    CREATE TABLE IF NOT EXISTS merge_audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL,
        canonical_entry_id INTEGER NOT NULL,
        payload TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    );
";

/// [`SchemaIntrospector`] over a SQLite connection.
///
/// Probes the live schema on every call; nothing is cached.
pub struct SqliteIntrospector<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteIntrospector<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl SchemaIntrospector for SqliteIntrospector<'_> {
    fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn columns(&self, table: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(columns)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

/// Quotes an SQL identifier. Table and column names reach SQL text only through this.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `?, ?, ?` with `n` positional placeholders, for `IN (...)` lists.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
