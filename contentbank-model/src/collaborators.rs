//! Interfaces the merge engine consumes but does not implement.
//!
//! Data collaborators take the connection as an argument: during an apply the
//! engine hands them its open transaction, so their writes commit or roll back
//! together with the reference rewrite.

use crate::{EntityId, EntryId, MergeOptions, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Strict duplicate detection (same type, content and format).
pub trait DuplicateGroupResolver: Send + Sync {
    /// Every entity in the strict duplicate group containing `representative`,
    /// the representative included. Empty when the representative does not exist.
    fn group_entity_ids(&self, conn: &Connection, representative: EntityId)
    -> Result<Vec<EntityId>>;
}

/// Usage statistics for entries and entities.
pub trait UsageCounter: Send + Sync {
    /// AttemptRecord count per entry, across every version of the entry.
    /// Entries without attempts may be absent from the map.
    fn attempt_counts(&self, conn: &Connection, entry_ids: &[EntryId])
    -> Result<BTreeMap<EntryId, u64>>;

    /// Secondary usage (inclusion in assemblies) per entity.
    fn secondary_usage(
        &self,
        conn: &Connection,
        entity_ids: &[EntityId],
    ) -> Result<BTreeMap<EntityId, u64>>;
}

/// What a safe delete found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Removes an entity together with its own definitional rows.
pub trait SafeDelete: Send + Sync {
    /// Must be idempotent: a missing entity yields [`DeleteOutcome::AlreadyAbsent`].
    fn delete(&self, conn: &Connection, entity_id: EntityId) -> Result<DeleteOutcome>;
}

/// One completed merge, as written to the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeAuditEvent {
    pub event_id: String,
    /// Unix epoch milliseconds.
    pub recorded_at: i64,
    pub canonical_entry_id: EntryId,
    pub canonical_entity_id: EntityId,
    pub merged_entry_ids: Vec<EntryId>,
    pub deleted_entity_ids: Vec<EntityId>,
    pub updated: BTreeMap<String, u64>,
    pub options: MergeOptions,
}

/// Receives audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, conn: &Connection, event: &MergeAuditEvent) -> Result<()>;
}

/// Drops cached data derived from content rows.
pub trait CacheInvalidator: Send + Sync {
    fn purge_all(&self);
}

/// Read-only view of the live schema.
pub trait SchemaIntrospector {
    /// All user tables, sorted by name.
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Column names of `table`; empty if the table does not exist.
    fn columns(&self, table: &str) -> Result<BTreeSet<String>>;

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.list_tables()?.iter().any(|t| t == table))
    }
}

/// A held advisory lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub name: String,
    pub token: String,
}

/// Named, best-effort mutual exclusion across processes.
pub trait LockService: Send + Sync {
    /// Waits up to `timeout` for the lock. `Ok(None)` means the wait timed out.
    fn acquire(&self, name: &str, timeout: Duration) -> Result<Option<LockToken>>;

    fn release(&self, token: LockToken) -> Result<()>;
}
