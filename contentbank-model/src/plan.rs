//! The merge plan and the result of applying one.

use crate::{EntityId, EntryId, Impact, ReferenceTarget, TargetKind, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// Caller options for planning and applying a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Scan every table for conventionally named pointer columns, not just the whitelist.
    #[serde(default)]
    pub advanced_discovery: bool,
}

/// What the planner learned about one entry of the duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub entry_id: EntryId,
    /// Current version: highest version number that is not a draft.
    pub version_id: VersionId,
    /// Entity of the current version.
    pub entity_id: EntityId,
    /// Entities of every version of the entry, current one included.
    pub entity_ids: Vec<EntityId>,
    pub attempt_count: u64,
    pub usage_count: u64,
    pub category_id: i64,
    pub context_id: i64,
}

/// Entries and entities left out of the merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    /// Entries protected by attempt history.
    pub has_usage_history: Vec<EntryId>,
    /// Group members that no longer resolve to a version row.
    pub not_found: Vec<EntityId>,
}

/// old → new id maps, one per pointer kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMappings {
    pub entity: BTreeMap<EntityId, EntityId>,
    pub entry: BTreeMap<EntryId, EntryId>,
    pub version: BTreeMap<VersionId, VersionId>,
}

impl IdMappings {
    /// Raw `(old, new)` pairs for one kind, identity mappings excluded.
    ///
    /// A self-mapping would count the survivor's own references as leftovers.
    pub fn pairs(&self, kind: TargetKind) -> Vec<(i64, i64)> {
        fn collect<K: Copy + Into<i64>, V: Copy + Into<i64>>(
            map: &BTreeMap<K, V>,
        ) -> Vec<(i64, i64)> {
            map.iter()
                .map(|(old, new)| ((*old).into(), (*new).into()))
                .filter(|(old, new)| old != new)
                .collect()
        }
        match kind {
            TargetKind::Entity => collect(&self.entity),
            TargetKind::Entry => collect(&self.entry),
            TargetKind::Version => collect(&self.version),
        }
    }

    /// Raw old ids for one kind, identity mappings excluded.
    pub fn old_ids(&self, kind: TargetKind) -> Vec<i64> {
        self.pairs(kind).into_iter().map(|(old, _)| old).collect()
    }

    /// True when there is nothing to rewrite at entry or entity level.
    pub fn is_empty(&self) -> bool {
        self.pairs(TargetKind::Entry).is_empty() && self.pairs(TargetKind::Entity).is_empty()
    }
}

/// Display-only summary of the duplicate group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub entity_type: String,
    pub name: String,
    pub size: usize,
}

/// A computed, pre-validated merge. Never persisted; rebuilt for every apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePlan {
    pub representative_entity_id: EntityId,
    pub group: GroupSummary,
    pub entries: BTreeMap<EntryId, EntryInfo>,
    pub canonical_entry_id: Option<EntryId>,
    pub mergeable_entry_ids: Vec<EntryId>,
    pub skipped: Skipped,
    pub mappings: IdMappings,
    pub targets: Vec<ReferenceTarget>,
    pub impacts: Vec<Impact>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl MergePlan {
    /// An empty plan for the given representative, to be filled by the planner.
    pub fn new(representative_entity_id: EntityId) -> Self {
        Self {
            representative_entity_id,
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Canonical entry info, if one was chosen.
    pub fn canonical(&self) -> Option<&EntryInfo> {
        self.canonical_entry_id.and_then(|id| self.entries.get(&id))
    }

    /// Every entity that the delete phase will remove, in id order.
    pub fn entities_to_delete(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .mergeable_entry_ids
            .iter()
            .filter_map(|id| self.entries.get(id))
            .flat_map(|info| info.entity_ids.iter().copied())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Total rows that currently point at a record about to be merged away.
    pub fn total_impact(&self) -> u64 {
        self.impacts.iter().map(|i| i.count).sum()
    }

    /// Human-readable dry-run report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Duplicate group of {} ({} '{}', representative entity {})",
            self.group.size, self.group.entity_type, self.group.name, self.representative_entity_id
        );
        match self.canonical() {
            Some(c) => {
                let _ = writeln!(
                    out,
                    "Canonical entry {} (entity {}, {} attempts)",
                    c.entry_id, c.entity_id, c.attempt_count
                );
            }
            None => out.push_str("No canonical entry\n"),
        }
        let _ = writeln!(out, "Mergeable entries: {}", join_ids(&self.mergeable_entry_ids));
        if !self.skipped.has_usage_history.is_empty() {
            let _ = writeln!(
                out,
                "Skipped (usage history): {}",
                join_ids(&self.skipped.has_usage_history)
            );
        }
        if !self.skipped.not_found.is_empty() {
            let _ = writeln!(out, "Skipped (not found): {}", join_ids(&self.skipped.not_found));
        }
        for impact in self.impacts.iter().filter(|i| i.count > 0) {
            let _ = writeln!(
                out,
                "  {}.{} ({}): {} rows",
                impact.table, impact.column, impact.kind, impact.count
            );
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "warning: {warning}");
        }
        for error in &self.errors {
            let _ = writeln!(out, "error: {error}");
        }
        out
    }
}

fn join_ids<T: fmt::Display>(ids: &[T]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Where an apply invocation ended up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePhase {
    #[default]
    Idle,
    Rewriting,
    PostChecking,
    Deleting,
    Committed,
    RolledBack,
}

impl fmt::Display for MergePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Rewriting => "rewriting",
            Self::PostChecking => "post-check",
            Self::Deleting => "deleting",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Per-target counters and the records touched by an apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDetails {
    /// Rows rewritten (or removed as duplicates), keyed by `table.column`.
    pub updated: BTreeMap<String, u64>,
    pub deleted: Vec<EntityId>,
    pub skipped: Skipped,
    pub warnings: Vec<String>,
}

/// Structured result of `apply_merge_plan`. Business failures never surface as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    pub message: String,
    pub phase: MergePhase,
    pub details: MergeDetails,
}

impl MergeOutcome {
    pub fn failure(message: impl Into<String>, phase: MergePhase) -> Self {
        Self {
            success: false,
            message: message.into(),
            phase,
            details: MergeDetails::default(),
        }
    }
}
