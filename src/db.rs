//! DbController Capability — consumed, not owned, by the core.
//!
//! [`SqliteDbController`] is the one shipped implementation: JSON-blob-in-a-
//! column storage over `rusqlite`. It stores documents rather than a
//! normalized relational schema: `Package` and `PackageVersion` round-trip
//! through `serde_json` exactly as received.

use crate::errors::DbError;
use crate::models::{Package, PackageSummary, PackageVersion, RepositoryDescriptor};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Abstract document store capability.
#[async_trait]
pub trait DbController: Send + Sync {
    async fn add_package(&self, pkg: &Package) -> Result<(), DbError>;
    async fn remove_package(&self, name: &str, owner: &str) -> Result<(), DbError>;
    async fn get_package(&self, name: &str) -> Result<Option<Package>, DbError>;
    async fn get_all_package_names(&self) -> Result<Vec<String>, DbError>;
    async fn get_user_packages(&self, owner: &str) -> Result<Vec<PackageSummary>, DbError>;

    /// All release versions for a package, in no particular order.
    async fn get_versions(&self, name: &str) -> Result<Vec<PackageVersion>, DbError>;
    /// All branch snapshots for a package, in no particular order.
    async fn get_branches(&self, name: &str) -> Result<Vec<PackageVersion>, DbError>;

    async fn has_version(&self, name: &str, version: &str) -> Result<bool, DbError>;
    async fn add_version(&self, name: &str, version: &PackageVersion) -> Result<(), DbError>;
    async fn update_version(&self, name: &str, version: &PackageVersion) -> Result<(), DbError>;
    /// Remove a stored ref by prefix: `~`-prefixed goes to branches,
    /// anything else is a release version.
    async fn remove_version(&self, name: &str, version: &str) -> Result<(), DbError>;

    async fn has_branch(&self, name: &str, branch: &str) -> Result<bool, DbError>;
    async fn add_branch(&self, name: &str, branch: &PackageVersion) -> Result<(), DbError>;
    async fn update_branch(&self, name: &str, branch: &PackageVersion) -> Result<(), DbError>;
    async fn remove_branch(&self, name: &str, branch: &str) -> Result<(), DbError>;

    async fn set_package_categories(&self, name: &str, categories: &[String]) -> Result<(), DbError>;
    async fn set_package_errors(&self, name: &str, errors: &[String]) -> Result<(), DbError>;

    async fn search_packages(&self, keywords: &str) -> Result<Vec<PackageSummary>, DbError>;
}

/// A `rusqlite`-backed [`DbController`].
///
/// `rusqlite::Connection` isn't `Sync`, so access is serialized behind a
/// `std::sync::Mutex` — a single-writer-at-a-time posture.
pub struct SqliteDbController {
    conn: Mutex<Connection>,
}

impl SqliteDbController {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), DbError> {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS packages
            (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                owner      TEXT NOT NULL,
                repository TEXT NOT NULL,
                categories TEXT NOT NULL,
                errors     TEXT NOT NULL,
                created    TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_name ON packages (name);
            CREATE TABLE IF NOT EXISTS package_versions
            (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                package_id INTEGER NOT NULL,
                version    TEXT    NOT NULL,
                is_branch  INTEGER NOT NULL,
                date       TEXT    NOT NULL,
                info       TEXT    NOT NULL,
                sha        TEXT,
                FOREIGN KEY (package_id) REFERENCES packages (id) ON DELETE CASCADE
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_package_versions_pkg_vers
                ON package_versions (package_id, version);
            COMMIT;
            "#,
        )?;
        Ok(())
    }

    fn package_id(conn: &Connection, name: &str) -> Result<i64, DbError> {
        conn.query_row("SELECT id FROM packages WHERE name = ?", params![name], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or_else(|| DbError::NotFound(name.to_string()))
    }

    fn row_to_package(
        name: String,
        owner: String,
        repository: String,
        categories: String,
        errors: String,
        created: String,
    ) -> Result<Package, DbError> {
        Ok(Package {
            name,
            owner,
            repository: serde_json::from_str::<RepositoryDescriptor>(&repository)?,
            categories: serde_json::from_str(&categories)?,
            errors: serde_json::from_str(&errors)?,
            date_added: created.parse().unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_version(
        version: String,
        date: String,
        info: String,
        sha: Option<String>,
    ) -> Result<PackageVersion, DbError> {
        Ok(PackageVersion {
            version,
            date: date.parse().unwrap_or_else(|_| Utc::now()),
            info: serde_json::from_str(&info)?,
            sha,
        })
    }

    fn upsert_version(
        conn: &Connection,
        package_id: i64,
        version: &PackageVersion,
        is_branch: bool,
    ) -> Result<(), DbError> {
        conn.execute(
            r#"
            INSERT INTO package_versions (package_id, version, is_branch, date, info, sha)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(package_id, version) DO UPDATE SET
                date = excluded.date,
                info = excluded.info,
                sha = excluded.sha
            "#,
            params![
                package_id,
                version.version,
                is_branch as i64,
                version.date.to_rfc3339(),
                serde_json::to_string(&version.info)?,
                version.sha
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DbController for SqliteDbController {
    async fn add_package(&self, pkg: &Package) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM packages WHERE name = ?",
                params![pkg.name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(DbError::Conflict(pkg.name.clone()));
        }
        conn.execute(
            r#"INSERT INTO packages (name, owner, repository, categories, errors, created)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                pkg.name,
                pkg.owner,
                serde_json::to_string(&pkg.repository)?,
                serde_json::to_string(&pkg.categories)?,
                serde_json::to_string(&pkg.errors)?,
                pkg.date_added.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    async fn remove_package(&self, name: &str, owner: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM packages WHERE name = ?1 AND owner = ?2",
            params![name, owner],
        )?;
        if affected == 0 {
            return Err(DbError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn get_package(&self, name: &str) -> Result<Option<Package>, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT name, owner, repository, categories, errors, created FROM packages WHERE name = ?",
            params![name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?
        .map(|(name, owner, repository, categories, errors, created)| {
            Self::row_to_package(name, owner, repository, categories, errors, created)
        })
        .transpose()
    }

    async fn get_all_package_names(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM packages ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn get_user_packages(&self, owner: &str) -> Result<Vec<PackageSummary>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, owner, categories, created FROM packages WHERE owner = ? ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![owner], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(name, owner, categories, created)| {
                Ok(PackageSummary {
                    name,
                    owner,
                    categories: serde_json::from_str(&categories)?,
                    date_added: created.parse().unwrap_or_else(|_| Utc::now()),
                })
            })
            .collect()
    }

    async fn get_versions(&self, name: &str) -> Result<Vec<PackageVersion>, DbError> {
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        let mut stmt = conn.prepare(
            "SELECT version, date, info, sha FROM package_versions WHERE package_id = ? AND is_branch = 0",
        )?;
        let rows = stmt
            .query_map(params![package_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(version, date, info, sha)| Self::row_to_version(version, date, info, sha))
            .collect()
    }

    async fn get_branches(&self, name: &str) -> Result<Vec<PackageVersion>, DbError> {
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        let mut stmt = conn.prepare(
            "SELECT version, date, info, sha FROM package_versions WHERE package_id = ? AND is_branch = 1",
        )?;
        let rows = stmt
            .query_map(params![package_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(version, date, info, sha)| Self::row_to_version(version, date, info, sha))
            .collect()
    }

    async fn has_version(&self, name: &str, version: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM package_versions WHERE package_id = ?1 AND version = ?2 AND is_branch = 0",
                params![package_id, version],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    async fn add_version(&self, name: &str, version: &PackageVersion) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        Self::upsert_version(&conn, package_id, version, false)
    }

    async fn update_version(&self, name: &str, version: &PackageVersion) -> Result<(), DbError> {
        self.add_version(name, version).await
    }

    async fn remove_version(&self, name: &str, version: &str) -> Result<(), DbError> {
        if version.starts_with('~') {
            return self.remove_branch(name, version.trim_start_matches('~')).await;
        }
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        conn.execute(
            "DELETE FROM package_versions WHERE package_id = ?1 AND version = ?2 AND is_branch = 0",
            params![package_id, version],
        )?;
        Ok(())
    }

    async fn has_branch(&self, name: &str, branch: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        let stored = format!("~{}", branch);
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM package_versions WHERE package_id = ?1 AND version = ?2 AND is_branch = 1",
                params![package_id, stored],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    async fn add_branch(&self, name: &str, branch: &PackageVersion) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        Self::upsert_version(&conn, package_id, branch, true)
    }

    async fn update_branch(&self, name: &str, branch: &PackageVersion) -> Result<(), DbError> {
        self.add_branch(name, branch).await
    }

    async fn remove_branch(&self, name: &str, branch: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let package_id = Self::package_id(&conn, name)?;
        let stored = format!("~{}", branch.trim_start_matches('~'));
        conn.execute(
            "DELETE FROM package_versions WHERE package_id = ?1 AND version = ?2 AND is_branch = 1",
            params![package_id, stored],
        )?;
        Ok(())
    }

    async fn set_package_categories(&self, name: &str, categories: &[String]) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE packages SET categories = ?1 WHERE name = ?2",
            params![serde_json::to_string(categories)?, name],
        )?;
        if affected == 0 {
            return Err(DbError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn set_package_errors(&self, name: &str, errors: &[String]) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE packages SET errors = ?1 WHERE name = ?2",
            params![serde_json::to_string(errors)?, name],
        )?;
        if affected == 0 {
            return Err(DbError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn search_packages(&self, keywords: &str) -> Result<Vec<PackageSummary>, DbError> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", keywords.to_lowercase());
        let mut stmt = conn.prepare(
            "SELECT name, owner, categories, created FROM packages
             WHERE lower(name) LIKE ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![pattern], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(name, owner, categories, created)| {
                Ok(PackageSummary {
                    name,
                    owner,
                    categories: serde_json::from_str(&categories)?,
                    date_added: created.parse().unwrap_or_else(|_| Utc::now()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_package(name: &str) -> Package {
        Package {
            name: name.to_string(),
            owner: "alice".to_string(),
            repository: RepositoryDescriptor::Git {
                url: "https://example.com/alice/foo.git".to_string(),
            },
            categories: vec![],
            errors: vec![],
            date_added: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_then_get_roundtrips() {
        let db = SqliteDbController::open_in_memory().unwrap();
        db.add_package(&sample_package("foo")).await.unwrap();
        let pkg = db.get_package("foo").await.unwrap().unwrap();
        assert_eq!(pkg.name, "foo");
        assert_eq!(pkg.owner, "alice");
    }

    #[tokio::test]
    async fn duplicate_add_is_conflict() {
        let db = SqliteDbController::open_in_memory().unwrap();
        db.add_package(&sample_package("foo")).await.unwrap();
        assert!(matches!(
            db.add_package(&sample_package("foo")).await,
            Err(DbError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn version_and_branch_admission() {
        let db = SqliteDbController::open_in_memory().unwrap();
        db.add_package(&sample_package("foo")).await.unwrap();

        let version = PackageVersion {
            version: "0.1.0".to_string(),
            date: Utc::now(),
            info: json!({"name": "foo"}),
            sha: Some("abc".to_string()),
        };
        assert!(!db.has_version("foo", "0.1.0").await.unwrap());
        db.add_version("foo", &version).await.unwrap();
        assert!(db.has_version("foo", "0.1.0").await.unwrap());

        let branch = PackageVersion {
            version: "~master".to_string(),
            date: Utc::now(),
            info: json!({"name": "foo"}),
            sha: Some("def".to_string()),
        };
        assert!(!db.has_branch("foo", "master").await.unwrap());
        db.add_branch("foo", &branch).await.unwrap();
        assert!(db.has_branch("foo", "master").await.unwrap());

        assert_eq!(db.get_versions("foo").await.unwrap().len(), 1);
        assert_eq!(db.get_branches("foo").await.unwrap().len(), 1);

        db.remove_version("foo", "~master").await.unwrap();
        assert!(!db.has_branch("foo", "master").await.unwrap());
        assert_eq!(db.get_branches("foo").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn remove_package_enforces_owner() {
        let db = SqliteDbController::open_in_memory().unwrap();
        db.add_package(&sample_package("foo")).await.unwrap();
        assert!(db.remove_package("foo", "mallory").await.is_err());
        db.remove_package("foo", "alice").await.unwrap();
        assert!(db.get_package("foo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_matches_substring() {
        let db = SqliteDbController::open_in_memory().unwrap();
        db.add_package(&sample_package("foo-cli")).await.unwrap();
        db.add_package(&sample_package("bar")).await.unwrap();
        let results = db.search_packages("foo").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "foo-cli");
    }
}
