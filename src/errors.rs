//! Error taxonomy for the registry core.
//!
//! Kept deliberately flat — callers match on variants rather than digging
//! through nested causes. Per-ref failures inside the reconciler are *not*
//! represented here; those are collapsed to strings and appended to
//! `Package.errors` (see `reconciler`).

use thiserror::Error;

/// Errors surfaced to callers of the [`crate::facade::Registry`] entry points.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid name `{0}`: must be non-empty ASCII [A-Za-z0-9_-]")]
    InvalidName(String),

    #[error("invalid ref `{0}`")]
    InvalidRef(String),

    #[error("package description is not a JSON object")]
    MalformedDescription,

    #[error("missing required field `{field}` on `{name}`")]
    MissingRequiredField { name: String, field: &'static str },

    #[error("version mismatch: tag says `{tag}`, info.version says `{info}`")]
    VersionMismatch { tag: String, info: String },

    #[error("duplicate version `{version}` for package `{name}`")]
    DuplicateVersion { name: String, version: String },

    #[error("no branch yielded a usable package description")]
    NoUsablePackageDescription,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("db error: {0}")]
    Db(#[from] DbError),

    #[error("not found: `{0}`")]
    NotFound(String),

    #[error("db conflict: `{0}` already exists")]
    DbConflict(String),
}

/// Errors from the abstract [`crate::repository::Repository`] capability.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Errors from the abstract [`crate::db::DbController`] capability.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not found: `{0}`")]
    NotFound(String),
    #[error("conflict: `{0}`")]
    Conflict(String),
}
