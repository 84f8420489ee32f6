//! Error types for the merge engine.

use contentbank_model::{EntityId, EntryId};
use thiserror::Error;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur while planning or applying a merge.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A collaborator (store, audit, usage counter) failed.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] contentbank_model::Error),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The plan maps no entry or entity ids.
    #[error("nothing to merge")]
    EmptyPlan,

    /// The plan was built with errors and cannot be applied.
    #[error("plan has errors: {0}")]
    PlanHasErrors(String),

    /// A reference-role table could not be rewritten.
    #[error("failed to rewrite {table}.{column}: {source}")]
    ReferenceRewrite {
        table: String,
        column: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Rows still point at merged records after the rewrite.
    #[error("{count} rows in {table}.{column} still reference merged records")]
    LeftoverReferences {
        table: String,
        column: String,
        count: u64,
    },

    /// A mergeable entry acquired attempt records after the plan was built.
    #[error("entry {entry} now has {attempts} attempt records")]
    UsageAppeared { entry: EntryId, attempts: u64 },

    /// The surviving entry, its entity or its current version vanished after planning.
    #[error("canonical {0} no longer exists")]
    CanonicalMissing(String),

    /// The safe-delete collaborator refused or failed.
    #[error("failed to delete entity {entity}: {source}")]
    DeleteFailed {
        entity: EntityId,
        #[source]
        source: contentbank_model::Error,
    },

    /// The shared connection mutex was poisoned by a panic.
    #[error("connection poisoned")]
    ConnectionPoisoned,
}
