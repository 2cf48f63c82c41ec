//! Data model for the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque descriptor consumed by the [`crate::repository::Repository`]
/// capability to locate a remote repository. A tagged union identifying
/// host + path. Adapters may extend this with more variants; the core never
/// inspects anything beyond matching on the variant to hand off to the
/// right adapter constructor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RepositoryDescriptor {
    /// Anything reachable over the plain git wire protocol: a clone URL.
    Git { url: String },
}

/// The catalog unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Lowercased, unique across the catalog.
    pub name: String,
    /// Opaque user identifier supplied by the caller.
    pub owner: String,
    /// Opaque descriptor consumed by the Repository capability.
    pub repository: RepositoryDescriptor,
    /// Ordered sequence of category strings.
    pub categories: Vec<String>,
    /// Human-readable error strings from the most recent reconciliation.
    pub errors: Vec<String>,
    /// Timestamp derived from the package record's creation.
    pub date_added: DateTime<Utc>,
}

/// A member of `versions` (release) or `branches` (mutable snapshot).
///
/// `version` here is the *stored* key: for releases, a bare semver string
/// (`1.2.3`, no `v` prefix); for branches, `~` + branch name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    /// Commit timestamp.
    pub date: DateTime<Utc>,
    /// Structured document copied verbatim from the upstream manifest, with
    /// a normalized lowercase `name` field.
    pub info: serde_json::Value,
    pub sha: Option<String>,
}

impl PackageVersion {
    /// True iff this entry belongs in `branches` rather than `versions`.
    pub fn is_branch(&self) -> bool {
        self.version.starts_with('~')
    }
}

/// A condensed row used by `searchPackages`/`getPackages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    pub owner: String,
    pub categories: Vec<String>,
    pub date_added: DateTime<Utc>,
}

/// Minimal commit metadata returned by the Repository capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub date: DateTime<Utc>,
}
