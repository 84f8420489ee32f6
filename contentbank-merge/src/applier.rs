//! Merge applier.
//!
//! Executes a plan inside one transaction:
//! `Idle → Rewriting → PostChecking → Deleting → Committed`, or `RolledBack`
//! from any phase. Nothing done before the commit is visible to other
//! connections, so a failure leaves every row as it was.

use crate::catalog::{SchemaSnapshot, dedup_targets, get_targets};
use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::impact::{compute_impacts, leftovers};
use crate::rewrite::{rewrite_plain, rewrite_reference};
use chrono::Utc;
use contentbank_model::{
    AuditSink, CacheInvalidator, DeleteOutcome, EntryId, MergeAuditEvent, MergeDetails,
    MergeOptions, MergeOutcome, MergePhase, MergePlan, ReferenceTarget, SafeDelete, TableRole,
    TargetKind, UsageCounter,
};
use contentbank_store::SqliteIntrospector;
use contentbank_store::content::{get_entity, get_entry, versions_of_entry};
use rusqlite::{Connection, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Applies merge plans.
pub struct MergeApplier<'a> {
    config: &'a MergeConfig,
    usage: &'a dyn UsageCounter,
    deleter: &'a dyn SafeDelete,
    audit: &'a dyn AuditSink,
    cache: &'a dyn CacheInvalidator,
}

impl<'a> MergeApplier<'a> {
    pub fn new(
        config: &'a MergeConfig,
        usage: &'a dyn UsageCounter,
        deleter: &'a dyn SafeDelete,
        audit: &'a dyn AuditSink,
        cache: &'a dyn CacheInvalidator,
    ) -> Self {
        Self {
            config,
            usage,
            deleter,
            audit,
            cache,
        }
    }

    /// Rejects plans that must not open a transaction at all.
    pub fn check_plan(plan: &MergePlan) -> MergeResult<()> {
        if plan.has_errors() {
            return Err(MergeError::PlanHasErrors(plan.errors.join("; ")));
        }
        if plan.mappings.is_empty() {
            return Err(MergeError::EmptyPlan);
        }
        Ok(())
    }

    /// Applies `plan`. Never fails: every error is reported in the outcome.
    pub fn apply(
        &self,
        conn: &mut Connection,
        plan: &MergePlan,
        options: &MergeOptions,
    ) -> MergeOutcome {
        if let Err(e) = Self::check_plan(plan) {
            let mut outcome = MergeOutcome::failure(e.to_string(), MergePhase::Idle);
            outcome.details.skipped = plan.skipped.clone();
            outcome.details.warnings = plan.warnings.clone();
            return outcome;
        }

        let mut phase = MergePhase::Idle;
        let mut details = match self.run(conn, plan, options, &mut phase) {
            Ok(details) => details,
            Err(e) => {
                warn!("Merge rolled back during {}: {}", phase, e);
                return MergeOutcome {
                    success: false,
                    message: format!("merge rolled back during {phase}: {e}"),
                    phase: MergePhase::RolledBack,
                    details: MergeDetails {
                        skipped: plan.skipped.clone(),
                        warnings: plan.warnings.clone(),
                        ..Default::default()
                    },
                };
            }
        };

        let rows_touched: u64 = details.updated.values().sum();
        if details.deleted.is_empty() && rows_touched == 0 {
            info!("Merge plan for entity {} changed nothing", plan.representative_entity_id);
            return MergeOutcome {
                success: true,
                message: "nothing changed: the duplicates were already merged".to_string(),
                phase,
                details,
            };
        }

        self.cache.purge_all();
        if let Err(e) = self.record_audit(conn, plan, options, &details) {
            warn!("Failed to write merge audit record: {}", e);
            details
                .warnings
                .push(format!("audit record not written: {e}"));
        }

        let canonical = plan
            .canonical_entry_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        info!(
            "Merged entries {:?} into {} ({} rows rewritten, {} entities deleted)",
            plan.mergeable_entry_ids,
            canonical,
            rows_touched,
            details.deleted.len()
        );
        MergeOutcome {
            success: true,
            message: format!(
                "merged {} entries into entry {}",
                plan.mergeable_entry_ids.len(),
                canonical
            ),
            phase,
            details,
        }
    }

    fn run(
        &self,
        conn: &mut Connection,
        plan: &MergePlan,
        options: &MergeOptions,
        phase: &mut MergePhase,
    ) -> MergeResult<MergeDetails> {
        let tx = conn.transaction()?;
        let mut details = MergeDetails {
            skipped: plan.skipped.clone(),
            warnings: plan.warnings.clone(),
            ..Default::default()
        };

        *phase = MergePhase::Rewriting;
        self.verify_unprotected(&tx, plan)?;
        Self::verify_canonical(&tx, plan)?;
        let snapshot = SchemaSnapshot::capture(&SqliteIntrospector::new(&tx))?;
        let targets = self.resolve_targets(&snapshot, plan, options);
        for target in &targets {
            let pairs = plan.mappings.pairs(target.kind);
            if pairs.is_empty() {
                continue;
            }
            let touched = if target.role == TableRole::Reference && target.kind == TargetKind::Entry
            {
                rewrite_reference(&tx, target, &pairs, &snapshot, &self.config.discovery).map_err(
                    |source| MergeError::ReferenceRewrite {
                        table: target.table.clone(),
                        column: target.column.clone(),
                        source,
                    },
                )?
            } else {
                match rewrite_plain(&tx, target, &pairs) {
                    Ok(touched) => touched,
                    Err(e) => {
                        // The post-check decides whether this is fatal.
                        warn!("Could not rewrite {}: {}", target.qualified_name(), e);
                        details
                            .warnings
                            .push(format!("could not rewrite {}: {e}", target.qualified_name()));
                        0
                    }
                }
            };
            debug!("Rewrote {} rows in {}", touched, target.qualified_name());
            details.updated.insert(target.qualified_name(), touched);
        }

        *phase = MergePhase::PostChecking;
        let after = compute_impacts(&tx, &targets, &plan.mappings)?;
        if let Some(left) = leftovers(&after).next() {
            return Err(MergeError::LeftoverReferences {
                table: left.table.clone(),
                column: left.column.clone(),
                count: left.count,
            });
        }

        *phase = MergePhase::Deleting;
        for entity_id in plan.entities_to_delete() {
            match self.deleter.delete(&tx, entity_id) {
                Ok(DeleteOutcome::Deleted) => details.deleted.push(entity_id),
                Ok(DeleteOutcome::AlreadyAbsent) => {
                    debug!("Entity {} was already removed", entity_id);
                }
                Err(source) => {
                    return Err(MergeError::DeleteFailed {
                        entity: entity_id,
                        source,
                    });
                }
            }
        }

        tx.commit()?;
        *phase = MergePhase::Committed;
        Ok(details)
    }

    /// Plan targets that still exist, plus targets probed now with the apply options.
    ///
    /// Blocklisted tables are dropped whatever their source.
    fn resolve_targets(
        &self,
        snapshot: &SchemaSnapshot,
        plan: &MergePlan,
        options: &MergeOptions,
    ) -> Vec<ReferenceTarget> {
        let planned = plan
            .targets
            .iter()
            .filter(|t| snapshot.has_column(&t.table, &t.column))
            .cloned();
        dedup_targets(planned.chain(get_targets(snapshot, self.config, options)))
            .into_iter()
            .filter(|t| !self.config.discovery.blocklist.contains(&t.table))
            .collect()
    }

    /// Aborts if an entry about to be merged away gained attempt records since planning.
    fn verify_unprotected(&self, tx: &Transaction<'_>, plan: &MergePlan) -> MergeResult<()> {
        let entries: Vec<EntryId> = plan
            .mergeable_entry_ids
            .iter()
            .chain(plan.mappings.entry.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let counts = self.usage.attempt_counts(tx, &entries)?;
        if let Some((entry, attempts)) = counts.into_iter().find(|(_, n)| *n > 0) {
            return Err(MergeError::UsageAppeared { entry, attempts });
        }
        Ok(())
    }

    /// Aborts if the survivor every reference is about to point at is gone.
    fn verify_canonical(tx: &Transaction<'_>, plan: &MergePlan) -> MergeResult<()> {
        let Some(canonical) = plan.canonical() else {
            return Err(MergeError::CanonicalMissing("entry".to_string()));
        };
        if get_entry(tx, canonical.entry_id)?.is_none() {
            return Err(MergeError::CanonicalMissing(format!(
                "entry {}",
                canonical.entry_id
            )));
        }
        if get_entity(tx, canonical.entity_id)?.is_none() {
            return Err(MergeError::CanonicalMissing(format!(
                "entity {}",
                canonical.entity_id
            )));
        }
        let version_present = versions_of_entry(tx, canonical.entry_id, false)?
            .iter()
            .any(|v| v.id == canonical.version_id && v.entity_id == canonical.entity_id);
        if !version_present {
            return Err(MergeError::CanonicalMissing(format!(
                "version {}",
                canonical.version_id
            )));
        }
        Ok(())
    }

    fn record_audit(
        &self,
        conn: &Connection,
        plan: &MergePlan,
        options: &MergeOptions,
        details: &MergeDetails,
    ) -> MergeResult<()> {
        let (Some(canonical_entry_id), Some(canonical)) =
            (plan.canonical_entry_id, plan.canonical())
        else {
            return Ok(());
        };
        let event = MergeAuditEvent {
            event_id: Uuid::now_v7().to_string(),
            recorded_at: Utc::now().timestamp_millis(),
            canonical_entry_id,
            canonical_entity_id: canonical.entity_id,
            merged_entry_ids: plan.mergeable_entry_ids.clone(),
            deleted_entity_ids: details.deleted.clone(),
            updated: details.updated.clone(),
            options: *options,
        };
        self.audit.record(conn, &event)?;
        Ok(())
    }
}
