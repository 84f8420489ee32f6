//! Reference target catalog.
//!
//! Works over a [`SchemaSnapshot`] captured from the live schema, so the
//! whitelist probe and the discovery scan are pure functions that can be
//! exercised without a database.

use crate::config::{DiscoveryPolicy, MergeConfig, WhitelistEntry};
use contentbank_model::{
    MergeOptions, ReferenceTarget, Result, SchemaIntrospector, TableRole, TargetKind,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// Table → column set, captured once per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaSnapshot {
    /// Probes every table and its columns.
    pub fn capture(introspector: &dyn SchemaIntrospector) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for table in introspector.list_tables()? {
            let columns = introspector.columns(&table)?;
            tables.insert(table, columns);
        }
        Ok(Self { tables })
    }

    /// Builds a snapshot from literal descriptors.
    pub fn from_tables<'a>(
        tables: impl IntoIterator<Item = (&'a str, &'a [&'a str])>,
    ) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|(name, columns)| {
                    (
                        name.to_string(),
                        columns.iter().map(|c| c.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl SchemaIntrospector for SchemaSnapshot {
    fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn columns(&self, table: &str) -> Result<BTreeSet<String>> {
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.contains_key(table))
    }
}

/// Whitelisted columns that exist in the snapshot.
///
/// Blocklisted tables are dropped even when whitelisted: the bank's own
/// tables change only through the delete path.
pub fn whitelist_targets(
    snapshot: &SchemaSnapshot,
    whitelist: &[WhitelistEntry],
    policy: &DiscoveryPolicy,
) -> Vec<ReferenceTarget> {
    let mut targets = Vec::new();
    for entry in whitelist {
        if policy.blocklist.contains(&entry.table) {
            warn!("Ignoring blocklisted whitelist table {}", entry.table);
            continue;
        }
        for column in &entry.columns {
            if !snapshot.has_column(&entry.table, &column.column) {
                debug!("Whitelist column {}.{} not present", entry.table, column.column);
                continue;
            }
            if entry.role == TableRole::Reference && column.kind != TargetKind::Entry {
                warn!(
                    "Ignoring {}.{}: reference tables are rewritten by entry only",
                    entry.table, column.column
                );
                continue;
            }
            targets.push(
                ReferenceTarget::new(&entry.table, &column.column, column.kind)
                    .with_role(entry.role),
            );
        }
    }
    targets
}

/// Conventionally named pointer columns in every table the policy allows.
pub fn discover_targets(snapshot: &SchemaSnapshot, policy: &DiscoveryPolicy) -> Vec<ReferenceTarget> {
    let mut targets = Vec::new();
    for table in snapshot.table_names() {
        if policy.is_excluded(table) {
            continue;
        }
        let role = policy.classify(table);
        for kind in [TargetKind::Entity, TargetKind::Entry, TargetKind::Version] {
            if role == TableRole::Reference && kind != TargetKind::Entry {
                // Version pins in reference tables are reset, never copied.
                continue;
            }
            if snapshot.has_column(table, kind.column_name()) {
                targets.push(ReferenceTarget::new(table, kind.column_name(), kind).with_role(role));
            }
        }
    }
    targets
}

/// Every place the applier must rewrite, deduplicated by `(table, column)`.
pub fn get_targets(
    snapshot: &SchemaSnapshot,
    config: &MergeConfig,
    options: &MergeOptions,
) -> Vec<ReferenceTarget> {
    let mut targets = whitelist_targets(snapshot, &config.whitelist, &config.discovery);
    if options.advanced_discovery {
        targets.extend(discover_targets(snapshot, &config.discovery));
    }
    dedup_targets(targets)
}

/// Keeps the first target seen for each `(table, column)`.
pub fn dedup_targets(targets: impl IntoIterator<Item = ReferenceTarget>) -> Vec<ReferenceTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert((t.table.clone(), t.column.clone())))
        .collect()
}
