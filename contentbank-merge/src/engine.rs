//! Merge engine: the entry point an administrative surface talks to.

use crate::applier::MergeApplier;
use crate::config::MergeConfig;
use crate::error::MergeError;
use crate::lock::LockCoordinator;
use crate::planner::PlanBuilder;
use contentbank_model::{
    AuditSink, CacheInvalidator, DuplicateGroupResolver, EntityId, LockService, MergeOptions,
    MergeOutcome, MergePhase, MergePlan, SafeDelete, UsageCounter,
};
use contentbank_store::{
    CascadingDelete, ContentStore, EpochCache, ExactDuplicateResolver, SqliteAuditLog,
    SqliteUsageCounter,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Plans and applies duplicate-entry merges against one content store.
pub struct MergeEngine {
    conn: Arc<Mutex<Connection>>,
    config: MergeConfig,
    resolver: Arc<dyn DuplicateGroupResolver>,
    usage: Arc<dyn UsageCounter>,
    deleter: Arc<dyn SafeDelete>,
    audit: Arc<dyn AuditSink>,
    cache: Arc<dyn CacheInvalidator>,
    locks: LockCoordinator,
}

impl MergeEngine {
    /// Creates an engine over `store` with the store's own collaborators and no lock service.
    pub fn new(store: &ContentStore, config: MergeConfig) -> Self {
        Self {
            conn: store.connection(),
            config,
            resolver: Arc::new(ExactDuplicateResolver),
            usage: Arc::new(SqliteUsageCounter),
            deleter: Arc::new(CascadingDelete),
            audit: Arc::new(SqliteAuditLog),
            cache: Arc::new(EpochCache::new()),
            locks: LockCoordinator::unlocked(),
        }
    }

    pub fn with_lock_service(mut self, service: Arc<dyn LockService>) -> Self {
        self.locks = LockCoordinator::new(service);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DuplicateGroupResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_usage_counter(mut self, usage: Arc<dyn UsageCounter>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_safe_delete(mut self, deleter: Arc<dyn SafeDelete>) -> Self {
        self.deleter = deleter;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Computes a merge plan for the duplicate group of `representative`.
    ///
    /// Read-only and safe to call repeatedly.
    pub fn build_merge_plan(&self, representative: EntityId, options: &MergeOptions) -> MergePlan {
        let Ok(conn) = self.conn.lock() else {
            let mut plan = MergePlan::new(representative);
            plan.errors.push(MergeError::ConnectionPoisoned.to_string());
            return plan;
        };
        PlanBuilder::new(&self.config, self.resolver.as_ref(), self.usage.as_ref()).build(
            &conn,
            representative,
            options,
        )
    }

    /// Applies a plan atomically, under the advisory lock when it can be had.
    pub fn apply_merge_plan(&self, plan: &MergePlan, options: &MergeOptions) -> MergeOutcome {
        if let Err(e) = MergeApplier::check_plan(plan) {
            info!("Rejected merge plan for entity {}: {}", plan.representative_entity_id, e);
            let mut outcome = MergeOutcome::failure(e.to_string(), MergePhase::Idle);
            outcome.details.skipped = plan.skipped.clone();
            outcome.details.warnings = plan.warnings.clone();
            return outcome;
        }

        self.locks
            .with_lock(&self.config.lock_name, self.config.lock_timeout(), || {
                let Ok(mut conn) = self.conn.lock() else {
                    return MergeOutcome::failure(
                        MergeError::ConnectionPoisoned.to_string(),
                        MergePhase::Idle,
                    );
                };
                MergeApplier::new(
                    &self.config,
                    self.usage.as_ref(),
                    self.deleter.as_ref(),
                    self.audit.as_ref(),
                    self.cache.as_ref(),
                )
                .apply(&mut conn, plan, options)
            })
    }

    /// Builds a fresh plan and applies it.
    pub fn merge(&self, representative: EntityId, options: &MergeOptions) -> MergeOutcome {
        let plan = self.build_merge_plan(representative, options);
        self.apply_merge_plan(&plan, options)
    }
}
