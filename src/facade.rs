//! Registry Facade — the crate's single public entry point, tying the
//! DbController, Info Cache, Update Queue and Repository capabilities
//! together.

use crate::cache::InfoCache;
use crate::db::DbController;
use crate::errors::RegistryError;
use crate::metadata::{self, NameCheck};
use crate::models::{Package, PackageSummary, RepositoryDescriptor};
use crate::repository::RepositoryResolver;
use crate::worker::UpdateQueue;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// Preferred branch probed first by `add_package`.
const PREFERRED_BRANCH: &str = "master";

pub struct Registry {
    db: Arc<dyn DbController>,
    cache: Arc<InfoCache>,
    queue: Arc<UpdateQueue>,
    resolver: Arc<dyn RepositoryResolver>,
}

impl Registry {
    pub fn new(
        db: Arc<dyn DbController>,
        cache: Arc<InfoCache>,
        resolver: Arc<dyn RepositoryResolver>,
    ) -> Self {
        let queue = Arc::new(UpdateQueue::new(db.clone(), cache.clone(), resolver.clone()));
        Self {
            db,
            cache,
            queue,
            resolver,
        }
    }

    /// Onboard a new package: resolve the repository, probe branches for a
    /// usable description, validate it, persist, then enqueue a reconcile.
    pub async fn add_package(
        &self,
        repository: RepositoryDescriptor,
        owner: &str,
    ) -> Result<Package, RegistryError> {
        // 1. Obtain Repository via the descriptor.
        let repo = self.resolver.resolve(&repository).await?;

        // 2. List branches; prefer `~master`, else try each in order until
        // one yields a parseable info.
        let branches = repo.get_branches().await?;
        let preferred_first = {
            let mut ordered: Vec<_> = branches.iter().collect();
            ordered.sort_by_key(|(name, _)| if name == PREFERRED_BRANCH { 0 } else { 1 });
            ordered
        };

        let mut found: Option<Value> = None;
        for (_, commit) in preferred_first {
            if let Ok(bytes) = repo.read_file(&commit.sha, "/package.json").await {
                if let Ok(info) = serde_json::from_slice::<Value>(&bytes) {
                    found = Some(info);
                    break;
                }
            }
        }
        let info = found.ok_or(RegistryError::NoUsablePackageDescription)?;

        // 3 & 4. Validate the description and the name(s) within it.
        let name = metadata::validate(&info, NameCheck::Supply, None)?;

        // 5. Construct and persist.
        let package = Package {
            name,
            owner: owner.to_string(),
            repository,
            categories: Vec::new(),
            errors: Vec::new(),
            date_added: Utc::now(),
        };
        match self.db.add_package(&package).await {
            Ok(()) => {}
            Err(crate::errors::DbError::Conflict(name)) => {
                return Err(RegistryError::DbConflict(name))
            }
            Err(e) => return Err(e.into()),
        }

        // 6. Enqueue a trigger for the new package.
        self.queue.trigger_update(&package.name).await;

        Ok(package)
    }

    /// Remove a package, enforcing ownership via the DbController, and
    /// evict its cache entry.
    pub async fn remove_package(&self, name: &str, owner: &str) -> Result<(), RegistryError> {
        self.db.remove_package(name, owner).await?;
        self.cache.invalidate(name).await;
        Ok(())
    }

    /// Normal mode populates the cache and omits `errors`; with-errors mode
    /// bypasses the cache both ways and includes `errors`.
    pub async fn get_package_info(
        &self,
        name: &str,
        include_errors: bool,
    ) -> Result<Value, RegistryError> {
        if !include_errors {
            if let Some(cached) = self.cache.get(name).await {
                return Ok(cached);
            }
        }

        let view = self.build_info_view(name, include_errors).await?;

        if !include_errors {
            self.cache.insert(name.to_string(), view.clone()).await;
        }

        Ok(view)
    }

    async fn build_info_view(
        &self,
        name: &str,
        include_errors: bool,
    ) -> Result<Value, RegistryError> {
        let package = self
            .db
            .get_package(name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let versions = self.db.get_versions(name).await?;
        let branches = self.db.get_branches(name).await?;
        let repo = self.resolver.resolve(&package.repository).await?;

        let mut versions_out = Vec::with_capacity(versions.len() + branches.len());
        for pv in versions.iter().chain(branches.iter()) {
            let download_ref = if pv.is_branch() {
                pv.version.clone()
            } else {
                format!("v{}", pv.version)
            };
            let mut entry = pv.info.clone();
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("version".to_string(), json!(pv.version));
                obj.insert("date".to_string(), json!(pv.date.to_rfc3339()));
                obj.insert("url".to_string(), json!(repo.get_download_url(&download_ref)));
                obj.insert(
                    "downloadUrl".to_string(),
                    json!(repo.get_download_url(&download_ref)),
                );
            }
            versions_out.push(entry);
        }

        let mut view = json!({
            "dateAdded": package.date_added.to_rfc3339(),
            "name": package.name,
            "repository": package.repository,
            "categories": package.categories,
            "versions": versions_out,
        });
        if include_errors {
            if let Some(obj) = view.as_object_mut() {
                obj.insert("errors".to_string(), json!(package.errors));
            }
        }
        Ok(view)
    }

    pub async fn get_packages(&self, owner: &str) -> Result<Vec<PackageSummary>, RegistryError> {
        Ok(self.db.get_user_packages(owner).await?)
    }

    /// Per spec §6, `searchPackages` returns the same per-package `view`
    /// `getPackageInfo` does, not a bare [`PackageSummary`] — §4.D's
    /// `searchPackages` is the name-matching query that narrows the
    /// candidate set; building each result out to a full view (normal mode,
    /// cache-populating) is this method's job.
    pub async fn search_packages(&self, keywords: &str) -> Result<Vec<Value>, RegistryError> {
        let mut views = Vec::new();
        for summary in self.db.search_packages(keywords).await? {
            views.push(self.get_package_info(&summary.name, false).await?);
        }
        Ok(views)
    }

    pub async fn set_package_categories(
        &self,
        name: &str,
        categories: &[String],
    ) -> Result<(), RegistryError> {
        Ok(self.db.set_package_categories(name, categories).await?)
    }

    pub async fn trigger_package_update(&self, name: &str) {
        self.queue.trigger_update(name).await;
    }

    pub async fn is_package_scheduled_for_update(&self, name: &str) -> bool {
        self.queue.is_scheduled_for_update(name).await
    }

    /// Enumerates every known package and enqueues each for reconciliation.
    /// Meant to be driven by an external periodic timer; the timer itself
    /// lives in `main`.
    pub async fn check_for_new_versions(&self) -> Result<(), RegistryError> {
        for name in self.db.get_all_package_names().await? {
            self.queue.trigger_update(&name).await;
        }
        Ok(())
    }
}
