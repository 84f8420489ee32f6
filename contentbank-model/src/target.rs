//! Where pointers to content records live, and how many still point at merged ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of identifier a reference column stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Entity,
    Entry,
    Version,
}

impl TargetKind {
    /// Conventional column name for this kind of pointer.
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Entity => "entity_id",
            Self::Entry => "entry_id",
            Self::Version => "version_id",
        }
    }

    /// Inverse of [`TargetKind::column_name`].
    pub fn from_column(column: &str) -> Option<Self> {
        match column {
            "entity_id" => Some(Self::Entity),
            "entry_id" => Some(Self::Entry),
            "version_id" => Some(Self::Version),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::Entry => f.write_str("entry"),
            Self::Version => f.write_str("version"),
        }
    }
}

/// How rows of a table are rewritten.
///
/// Reference-role tables carry uniqueness over their key columns and pin a
/// version of the entry they point at, so they are deduplicated and unpinned
/// instead of updated in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    #[default]
    Plain,
    Reference,
}

/// One table/column that may hold a pointer to a merged record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceTarget {
    pub table: String,
    pub column: String,
    pub kind: TargetKind,
    #[serde(default)]
    pub role: TableRole,
}

impl ReferenceTarget {
    pub fn new(table: impl Into<String>, column: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            kind,
            role: TableRole::Plain,
        }
    }

    /// Builder-style role override.
    pub fn with_role(mut self, role: TableRole) -> Self {
        self.role = role;
        self
    }

    /// `table.column`, the key used in update counters.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// Number of rows in a target still pointing at an id that is about to go away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impact {
    pub table: String,
    pub column: String,
    pub kind: TargetKind,
    pub count: u64,
}
