//! Merge engine configuration.

use crate::error::MergeResult;
use contentbank_model::{TableRole, TargetKind, tables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration for the merge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Name of the advisory lock serializing merges.
    pub lock_name: String,
    /// How long to wait for the advisory lock before running without it.
    pub lock_timeout_secs: u64,
    /// Tables known to hold pointers to content records.
    pub whitelist: Vec<WhitelistEntry>,
    /// Rules for the opt-in discovery scan.
    pub discovery: DiscoveryPolicy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            lock_name: "contentbank_merge".to_string(),
            lock_timeout_secs: 10,
            whitelist: vec![
                WhitelistEntry {
                    table: tables::ASSEMBLY_SLOTS.to_string(),
                    role: TableRole::Plain,
                    columns: vec![
                        WhitelistColumn::new("entity_id", TargetKind::Entity),
                        WhitelistColumn::new("entry_id", TargetKind::Entry),
                    ],
                },
                WhitelistEntry {
                    table: tables::ENTRY_REFERENCES.to_string(),
                    role: TableRole::Reference,
                    columns: vec![WhitelistColumn::new("entry_id", TargetKind::Entry)],
                },
            ],
            discovery: DiscoveryPolicy::default(),
        }
    }
}

impl MergeConfig {
    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> MergeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// A known table and the pointer columns it may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub table: String,
    #[serde(default)]
    pub role: TableRole,
    pub columns: Vec<WhitelistColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistColumn {
    pub column: String,
    pub kind: TargetKind,
}

impl WhitelistColumn {
    pub fn new(column: &str, kind: TargetKind) -> Self {
        Self {
            column: column.to_string(),
            kind,
        }
    }
}

/// Which tables the discovery scan may touch and how it classifies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryPolicy {
    /// Tables never rewritten: the bank's own definitional, historical, audit and lock tables.
    pub blocklist: BTreeSet<String>,
    /// Name prefixes of the content-type implementation namespace.
    pub excluded_prefixes: Vec<String>,
    /// Name suffixes of log tables.
    pub excluded_suffixes: Vec<String>,
    /// Tables explicitly given the reference role.
    pub reference_tables: BTreeSet<String>,
    /// Name suffixes that give a discovered table the reference role.
    pub reference_suffixes: Vec<String>,
    /// Columns that identify one usage in a reference-role table, besides the entry.
    pub reference_key_columns: Vec<String>,
    /// Columns pinning a specific version of the referenced entry.
    pub version_pin_columns: Vec<String>,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        let blocklist = [
            tables::ENTITIES,
            tables::ENTRIES,
            tables::VERSIONS,
            tables::CATEGORIES,
            tables::ATTEMPTS,
            "attempt_steps",
            tables::MERGE_AUDIT_LOG,
            tables::ADVISORY_LOCKS,
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            blocklist,
            excluded_prefixes: vec!["ctype_".to_string()],
            excluded_suffixes: vec!["_log".to_string()],
            reference_tables: [tables::ENTRY_REFERENCES.to_string()].into_iter().collect(),
            reference_suffixes: vec!["_references".to_string()],
            reference_key_columns: ["context_id", "component", "area", "item_id"]
                .into_iter()
                .map(String::from)
                .collect(),
            version_pin_columns: vec!["pinned_version".to_string()],
        }
    }
}

impl DiscoveryPolicy {
    /// Whether the discovery scan must leave `table` alone.
    pub fn is_excluded(&self, table: &str) -> bool {
        self.blocklist.contains(table)
            || self.excluded_prefixes.iter().any(|p| table.starts_with(p.as_str()))
            || self.excluded_suffixes.iter().any(|s| table.ends_with(s.as_str()))
    }

    /// Role of a discovered table: explicit set first, then name suffix.
    pub fn classify(&self, table: &str) -> TableRole {
        if self.reference_tables.contains(table)
            || self.reference_suffixes.iter().any(|s| table.ends_with(s.as_str()))
        {
            TableRole::Reference
        } else {
            TableRole::Plain
        }
    }
}
