//! Version Admission.
//!
//! Decides add-vs-update for a given ref, writes through the
//! [`DbController`], and invalidates the [`InfoCache`] *before* the write —
//! the ordering a concurrent reader relies on to never observe a stale
//! value after the write commits.

use crate::cache::InfoCache;
use crate::db::DbController;
use crate::errors::RegistryError;
use crate::metadata::{self, NameCheck};
use crate::models::PackageVersion;
use crate::version::{self, Ref};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Result of an admission attempt. `is_new` is `true` for a brand new ref
/// and `false` when an existing ref was refreshed in place — used solely by
/// the Reconciler to decide whether to log an "added" line.
pub struct AdmissionOutcome {
    pub is_new: bool,
}

/// Admit `info` under `package_name` at `ref_str`.
pub async fn admit(
    db: &dyn DbController,
    cache: &InfoCache,
    package_name: &str,
    ref_str: &str,
    mut info: Value,
    sha: Option<String>,
    date: DateTime<Utc>,
) -> Result<AdmissionOutcome, RegistryError> {
    // 1. Invalidate unconditionally, before any write.
    cache.invalidate(package_name).await;

    // Determine ahead of time whether this looks like a release ref, so
    // the metadata validator (4.E step 5) can apply its version check. A
    // ref that doesn't classify at all just skips that check here — the
    // explicit reject happens below, at step 3.
    let classification = version::classify(ref_str);
    let tag_version = matches!(classification, Ok(Ref::Release(_))).then_some(ref_str);

    // 2. Run the metadata validator.
    let normalized_name = metadata::validate(&info, NameCheck::MustMatch(package_name), tag_version)?;
    if let Some(obj) = info.as_object_mut() {
        obj.insert("name".to_string(), Value::String(normalized_name));
    }

    // 3. Classify the ref; reject malformed ones.
    let classified = classification.map_err(|_| RegistryError::InvalidRef(ref_str.to_string()))?;

    match classified {
        Ref::Branch(name) => {
            let stored = format!("~{}", name);
            let pv = PackageVersion {
                version: stored,
                date,
                info,
                sha,
            };
            if db.has_branch(package_name, &name).await? {
                db.update_branch(package_name, &pv).await?;
                Ok(AdmissionOutcome { is_new: false })
            } else {
                db.add_branch(package_name, &pv).await?;
                Ok(AdmissionOutcome { is_new: true })
            }
        }
        Ref::Release(v) => {
            let stored = v.to_string();
            let pv = PackageVersion {
                version: stored.clone(),
                date,
                info,
                sha,
            };
            if db.has_version(package_name, &stored).await? {
                db.update_version(package_name, &pv).await?;
                Ok(AdmissionOutcome { is_new: false })
            } else {
                db.add_version(package_name, &pv).await?;
                Ok(AdmissionOutcome { is_new: true })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDbController;
    use crate::models::{Package, RepositoryDescriptor};
    use serde_json::json;

    async fn setup() -> (SqliteDbController, InfoCache) {
        let db = SqliteDbController::open_in_memory().unwrap();
        db.add_package(&Package {
            name: "foo".to_string(),
            owner: "alice".to_string(),
            repository: RepositoryDescriptor::Git {
                url: "https://example.com/alice/foo.git".to_string(),
            },
            categories: vec![],
            errors: vec![],
            date_added: Utc::now(),
        })
        .await
        .unwrap();
        (db, InfoCache::new())
    }

    fn good_info() -> Value {
        json!({"name": "foo", "license": "MIT", "description": "x"})
    }

    #[tokio::test]
    async fn first_admission_of_release_is_new() {
        let (db, cache) = setup().await;
        let outcome = admit(&db, &cache, "foo", "0.1.0", good_info(), None, Utc::now())
            .await
            .unwrap();
        assert!(outcome.is_new);
        assert!(db.has_version("foo", "0.1.0").await.unwrap());
    }

    #[tokio::test]
    async fn repeat_admission_of_release_is_update() {
        let (db, cache) = setup().await;
        admit(&db, &cache, "foo", "0.1.0", good_info(), None, Utc::now())
            .await
            .unwrap();
        let outcome = admit(&db, &cache, "foo", "0.1.0", good_info(), None, Utc::now())
            .await
            .unwrap();
        assert!(!outcome.is_new);
    }

    #[tokio::test]
    async fn branch_admission_roundtrips() {
        let (db, cache) = setup().await;
        let outcome = admit(&db, &cache, "foo", "~master", good_info(), None, Utc::now())
            .await
            .unwrap();
        assert!(outcome.is_new);
        assert!(db.has_branch("foo", "master").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_ref_is_rejected() {
        let (db, cache) = setup().await;
        let err = admit(&db, &cache, "foo", "~~double", good_info(), None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRef(_)));
    }

    #[tokio::test]
    async fn version_mismatch_on_release_is_rejected() {
        let (db, cache) = setup().await;
        let mut info = good_info();
        info["version"] = json!("9.9.9");
        let err = admit(&db, &cache, "foo", "0.1.0", info, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn cache_is_invalidated_even_on_failed_admission() {
        let (db, cache) = setup().await;
        cache.insert("foo".to_string(), json!({"stale": true})).await;
        let info = json!({"name": "foo"}); // missing license/description
        let _ = admit(&db, &cache, "foo", "0.1.0", info, None, Utc::now()).await;
        assert!(cache.get("foo").await.is_none());
    }
}
