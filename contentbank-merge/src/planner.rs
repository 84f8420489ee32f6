//! Plan builder: turns a representative entity into a [`MergePlan`].
//!
//! Read-only. Failures are collected into `plan.errors` so a caller can
//! still render a dry run.

use crate::catalog::{SchemaSnapshot, get_targets};
use crate::config::MergeConfig;
use crate::error::MergeResult;
use crate::impact::compute_impacts;
use contentbank_model::{
    DuplicateGroupResolver, EntityId, EntryId, EntryInfo, MergeOptions, MergePlan, UsageCounter,
    Version, tables,
};
use contentbank_store::SqliteIntrospector;
use contentbank_store::content::{get_entity, get_entry, version_for_entity, versions_of_entry};
use rusqlite::Connection;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// The survivor: most attempts, ties broken by the smallest entry id.
pub fn choose_canonical(candidates: impl IntoIterator<Item = (EntryId, u64)>) -> Option<EntryId> {
    candidates
        .into_iter()
        .max_by(|(a_id, a_attempts), (b_id, b_attempts)| {
            a_attempts.cmp(b_attempts).then_with(|| b_id.cmp(a_id))
        })
        .map(|(id, _)| id)
}

/// Highest-numbered version that is not a draft.
pub fn current_version(versions: &[Version]) -> Option<&Version> {
    versions
        .iter()
        .filter(|v| v.is_usable())
        .max_by_key(|v| v.version)
}

/// Builds merge plans from a duplicate group.
pub struct PlanBuilder<'a> {
    config: &'a MergeConfig,
    resolver: &'a dyn DuplicateGroupResolver,
    usage: &'a dyn UsageCounter,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(
        config: &'a MergeConfig,
        resolver: &'a dyn DuplicateGroupResolver,
        usage: &'a dyn UsageCounter,
    ) -> Self {
        Self {
            config,
            resolver,
            usage,
        }
    }

    /// Builds a plan. Never fails: errors end up in `plan.errors`.
    pub fn build(
        &self,
        conn: &Connection,
        representative: EntityId,
        options: &MergeOptions,
    ) -> MergePlan {
        let mut plan = MergePlan::new(representative);
        if let Err(e) = self.populate(conn, &mut plan, options) {
            warn!("Failed to plan merge for entity {}: {}", representative, e);
            plan.errors.push(e.to_string());
        }
        debug!(
            "Plan for entity {}: canonical={:?} mergeable={} errors={}",
            representative,
            plan.canonical_entry_id,
            plan.mergeable_entry_ids.len(),
            plan.errors.len()
        );
        plan
    }

    fn populate(
        &self,
        conn: &Connection,
        plan: &mut MergePlan,
        options: &MergeOptions,
    ) -> MergeResult<()> {
        let representative = plan.representative_entity_id;
        let group = self.resolver.group_entity_ids(conn, representative)?;
        plan.group.size = group.len();
        if group.len() < 2 {
            plan.errors.push(format!(
                "entity {representative} is not part of a duplicate group ({} members)",
                group.len()
            ));
            return Ok(());
        }

        let snapshot = SchemaSnapshot::capture(&SqliteIntrospector::new(conn))?;
        let with_status =
            snapshot.has_column(tables::VERSIONS, tables::VERSION_STATUS_COLUMN);

        let mut entry_ids = BTreeSet::new();
        for entity_id in &group {
            match version_for_entity(conn, *entity_id, with_status)? {
                Some(version) => {
                    entry_ids.insert(version.entry_id);
                }
                None => plan.skipped.not_found.push(*entity_id),
            }
        }
        if plan.skipped.not_found.contains(&representative) {
            plan.errors
                .push(format!("entity {representative} not found in the content bank"));
            return Ok(());
        }
        if entry_ids.len() < 2 {
            plan.errors.push(format!(
                "the duplicates of entity {representative} are versions of the same entry, not a cross-entry duplicate"
            ));
            return Ok(());
        }

        let entry_ids: Vec<EntryId> = entry_ids.into_iter().collect();
        let attempts = self.usage.attempt_counts(conn, &entry_ids)?;
        for entry_id in entry_ids {
            let versions = versions_of_entry(conn, entry_id, with_status)?;
            let Some(current) = current_version(&versions) else {
                plan.errors
                    .push(format!("entry {entry_id} has no non-draft version"));
                continue;
            };
            let Some(entry) = get_entry(conn, entry_id)? else {
                plan.errors.push(format!("entry {entry_id} not found"));
                continue;
            };
            let mut entity_ids: Vec<EntityId> = versions.iter().map(|v| v.entity_id).collect();
            entity_ids.sort();
            entity_ids.dedup();
            let usage_count = self.usage.secondary_usage(conn, &entity_ids)?.values().sum();

            plan.entries.insert(
                entry_id,
                EntryInfo {
                    entry_id,
                    version_id: current.id,
                    entity_id: current.entity_id,
                    entity_ids,
                    attempt_count: attempts.get(&entry_id).copied().unwrap_or(0),
                    usage_count,
                    category_id: entry.category_id,
                    context_id: entry.context_id,
                },
            );
        }
        if plan.has_errors() {
            return Ok(());
        }

        let Some(canonical_id) = choose_canonical(
            plan.entries
                .values()
                .map(|info| (info.entry_id, info.attempt_count)),
        ) else {
            plan.errors.push("no canonical entry could be resolved".to_string());
            return Ok(());
        };
        plan.canonical_entry_id = Some(canonical_id);
        let canonical = plan.entries[&canonical_id].clone();

        for info in plan.entries.values() {
            if info.entry_id == canonical_id {
                continue;
            }
            if info.attempt_count > 0 {
                plan.skipped.has_usage_history.push(info.entry_id);
                continue;
            }
            plan.mergeable_entry_ids.push(info.entry_id);
            plan.mappings.entry.insert(info.entry_id, canonical_id);
            for entity_id in &info.entity_ids {
                plan.mappings.entity.insert(*entity_id, canonical.entity_id);
            }
            plan.mappings.version.insert(info.version_id, canonical.version_id);

            if info.context_id != canonical.context_id {
                plan.warnings.push(format!(
                    "entry {} is in context {} but the canonical entry {} is in context {}",
                    info.entry_id, info.context_id, canonical_id, canonical.context_id
                ));
            } else if info.category_id != canonical.category_id {
                plan.warnings.push(format!(
                    "entry {} is in category {} but the canonical entry {} is in category {}",
                    info.entry_id, info.category_id, canonical_id, canonical.category_id
                ));
            }
        }

        plan.targets = get_targets(&snapshot, self.config, options);
        plan.impacts = compute_impacts(conn, &plan.targets, &plan.mappings)?;

        if let Some(entity) = get_entity(conn, canonical.entity_id)? {
            plan.group.entity_type = entity.entity_type;
            plan.group.name = entity.name;
        }
        Ok(())
    }
}
