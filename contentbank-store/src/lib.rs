//! SQLite storage for the content bank.
//!
//! Owns the content schema (entities, entries, versions, categories,
//! attempts), the two known usage tables, and the concrete collaborators the
//! merge engine consumes:
//!
//! - [`ExactDuplicateResolver`]: strict duplicate groups
//! - [`SqliteUsageCounter`]: attempt and assembly usage counts
//! - [`CascadingDelete`]: idempotent entity removal
//! - [`SqliteAuditLog`]: merge audit trail
//! - [`EpochCache`]: cache invalidation
//! - [`SqliteLockService`]: lease-based advisory locks
//! - [`SqliteIntrospector`]: live schema probing

mod audit;
mod cache;
pub mod content;
mod delete;
mod duplicates;
mod lock;
mod schema;
mod usage;

pub use audit::SqliteAuditLog;
pub use cache::EpochCache;
pub use contentbank_model::{Error, Result};
pub use delete::CascadingDelete;
pub use duplicates::ExactDuplicateResolver;
pub use lock::SqliteLockService;
pub use schema::{SqliteIntrospector, placeholders, quote_ident};
pub use usage::SqliteUsageCounter;

use chrono::Utc;
use contentbank_model::{EntityId, EntryId, VersionId, VersionStatus};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Payload for a new content record.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub entity_type: String,
    pub name: String,
    pub content: String,
    pub content_format: String,
}

impl NewEntity {
    /// Shorthand for an HTML-formatted record.
    pub fn html(entity_type: &str, name: &str, content: &str) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            content: content.into(),
            content_format: "html".into(),
        }
    }
}

/// A usage row for the reference-role table.
#[derive(Debug, Clone)]
pub struct NewReference {
    pub context_id: i64,
    pub component: String,
    pub area: String,
    pub item_id: i64,
    pub entry_id: EntryId,
    pub pinned_version: Option<i64>,
}

/// Content bank store. The connection is shared with the merge engine.
pub struct ContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl ContentStore {
    /// Opens (or creates) a content store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Opens an in-memory content store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with_conn(Arc::new(Mutex::new(Connection::open_in_memory()?)))
    }

    /// Wraps an existing connection, creating the schema if needed.
    pub fn open_with_conn(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let store = Self { conn };
        store.lock()?.execute_batch(schema::CONTENT_SCHEMA)?;
        Ok(store)
    }

    /// Shared handle to the underlying connection.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Lock("content store connection poisoned".to_string()))
    }

    // ── Seeding ──────────────────────────────────────────────────

    pub fn create_category(&self, name: &str, context_id: i64) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO categories (name, context_id) VALUES (?1, ?2)",
            params![name, context_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Creates an empty entry in `category_id`, inheriting the category's context.
    pub fn create_entry(&self, category_id: i64) -> Result<EntryId> {
        let conn = self.lock()?;
        let context_id: i64 = conn
            .query_row(
                "SELECT context_id FROM categories WHERE id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::NotFound(format!("category {category_id}"))
                }
                other => other.into(),
            })?;
        conn.execute(
            "INSERT INTO entries (category_id, context_id) VALUES (?1, ?2)",
            params![category_id, context_id],
        )?;
        Ok(EntryId::new(conn.last_insert_rowid()))
    }

    /// Adds a new version to an entry, numbered after the latest existing one.
    pub fn add_version(
        &self,
        entry_id: EntryId,
        entity: &NewEntity,
        status: VersionStatus,
    ) -> Result<(EntityId, VersionId)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO entities (entity_type, name, content, content_format, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity.entity_type,
                entity.name,
                entity.content,
                entity.content_format,
                Utc::now().timestamp_millis(),
            ],
        )?;
        let entity_id = EntityId::new(tx.last_insert_rowid());
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM versions WHERE entry_id = ?1",
            params![entry_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO versions (entry_id, entity_id, version, status) VALUES (?1, ?2, ?3, ?4)",
            params![entry_id, entity_id, next, status.as_str()],
        )?;
        let version_id = VersionId::new(tx.last_insert_rowid());
        tx.commit()?;
        Ok((entity_id, version_id))
    }

    /// Creates an entry with a single ready version.
    pub fn create_item(&self, category_id: i64, entity: &NewEntity) -> Result<(EntryId, EntityId)> {
        let entry_id = self.create_entry(category_id)?;
        let (entity_id, _) = self.add_version(entry_id, entity, VersionStatus::Ready)?;
        Ok((entry_id, entity_id))
    }

    /// Records immutable usage evidence for an entity.
    pub fn record_attempt(&self, entity_id: EntityId, outcome: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO attempts (entity_id, outcome, attempted_at) VALUES (?1, ?2, ?3)",
            params![entity_id, outcome, Utc::now().timestamp_millis()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Places an entity in an assembly slot; the slot also records the entity's entry.
    pub fn add_slot(&self, assembly_id: i64, slot: i64, entity_id: EntityId) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO assembly_slots (assembly_id, slot, entity_id, entry_id)
             VALUES (?1, ?2, ?3, (SELECT entry_id FROM versions WHERE entity_id = ?3 LIMIT 1))",
            params![assembly_id, slot, entity_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_reference(&self, reference: &NewReference) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entry_references
                (context_id, component, area, item_id, entry_id, pinned_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                reference.context_id,
                reference.component,
                reference.area,
                reference.item_id,
                reference.entry_id,
                reference.pinned_version,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn get_entity(&self, id: EntityId) -> Result<Option<contentbank_model::Entity>> {
        let conn = self.lock()?;
        content::get_entity(&conn, id)
    }

    pub fn get_entry(&self, id: EntryId) -> Result<Option<contentbank_model::Entry>> {
        let conn = self.lock()?;
        content::get_entry(&conn, id)
    }

    pub fn versions_of_entry(&self, entry_id: EntryId) -> Result<Vec<contentbank_model::Version>> {
        let conn = self.lock()?;
        content::versions_of_entry(&conn, entry_id, true)
    }

    /// Rows of `table` whose `column` equals `value`.
    pub fn count_where(&self, table: &str, column: &str, value: i64) -> Result<u64> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(column)
        );
        let count: i64 = conn.query_row(&sql, params![value], |row| row.get(0))?;
        Ok(count as u64)
    }
}
