//! Core content bank model.
//!
//! Defines the types shared by the store and the merge engine:
//! - [`EntityId`], [`EntryId`], [`VersionId`]: typed row identifiers
//! - [`Entity`], [`Entry`], [`Version`]: the versioned content records
//! - [`ReferenceTarget`] / [`Impact`]: where pointers to content live and how many remain
//! - [`MergePlan`] / [`MergeOutcome`]: a computed merge and the result of applying it
//! - the collaborator traits the merge engine consumes ([`DuplicateGroupResolver`],
//!   [`UsageCounter`], [`SafeDelete`], [`AuditSink`], [`CacheInvalidator`],
//!   [`SchemaIntrospector`], [`LockService`])
//!
//! Collaborators that touch content data receive the connection explicitly so
//! that the merge engine can run them inside its own transaction.

mod collaborators;
mod content;
mod error;
mod ids;
mod plan;
pub mod tables;
mod target;

pub use collaborators::{
    AuditSink, CacheInvalidator, DeleteOutcome, DuplicateGroupResolver, LockService, LockToken,
    MergeAuditEvent, SafeDelete, SchemaIntrospector, UsageCounter,
};
pub use content::{Entity, Entry, Version, VersionStatus};
pub use error::{Error, Result};
pub use ids::{EntityId, EntryId, VersionId};
pub use plan::{
    EntryInfo, GroupSummary, IdMappings, MergeDetails, MergeOptions, MergeOutcome, MergePhase,
    MergePlan, Skipped,
};
pub use target::{Impact, ReferenceTarget, TableRole, TargetKind};
