//! Names of the tables owned by the content bank itself.
//!
//! The merge engine reads these directly and never rewrites them; only the
//! safe-delete path may remove rows from them.

pub const ENTITIES: &str = "entities";
pub const ENTRIES: &str = "entries";
pub const VERSIONS: &str = "versions";
pub const CATEGORIES: &str = "categories";
pub const ATTEMPTS: &str = "attempts";

/// Plain usage table: one row per slot in an assembly, pointing at an entity and its entry.
pub const ASSEMBLY_SLOTS: &str = "assembly_slots";
/// Reference-role table: usages that pin an entry and re-resolve its version.
pub const ENTRY_REFERENCES: &str = "entry_references";

pub const MERGE_AUDIT_LOG: &str = "merge_audit_log";
pub const ADVISORY_LOCKS: &str = "advisory_locks";

/// Column holding a version's status. Older schemas may not have it.
pub const VERSION_STATUS_COLUMN: &str = "status";
