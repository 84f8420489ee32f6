use crate::{EntityId, EntryId, VersionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single content record. Immutable once created apart from administrative fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: String,
    pub name: String,
    pub content: String,
    pub content_format: String,
    pub created_at: i64,
}

/// The logical slot that groups all versions of one conceptual item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub category_id: i64,
    pub context_id: i64,
}

/// Join record binding an entity to an entry at a version number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub entry_id: EntryId,
    pub entity_id: EntityId,
    pub version: i64,
    pub status: VersionStatus,
}

impl Version {
    /// Whether this version may represent its entry.
    pub fn is_usable(&self) -> bool {
        self.status != VersionStatus::Draft
    }
}

/// Publication status of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Ready,
    Hidden,
    Draft,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Hidden => "hidden",
            Self::Draft => "draft",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Self::Ready),
            "hidden" => Ok(Self::Hidden),
            "draft" => Ok(Self::Draft),
            other => Err(crate::Error::InvalidData(format!("unknown version status: {other}"))),
        }
    }
}
