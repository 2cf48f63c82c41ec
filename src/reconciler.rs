//! Reconciler — one run reconciles one package against its upstream
//! repository.
//!
//! Step-by-step failure isolation is the whole point of this module: a
//! repository outage or a single bad tag must never poison the rest of the
//! catalog. Every error that doesn't abort the run outright gets collapsed
//! to a string and appended to `Package.errors`.

use crate::admission;
use crate::cache::InfoCache;
use crate::db::DbController;
use crate::models::CommitInfo;
use crate::repository::{Repository, RepositoryResolver};
use crate::version;
use std::collections::HashSet;

/// Run one reconciler pass for `package_name`. Never returns an `Err` —
/// failures are recorded in the returned error list (and, except for an
/// initial snapshot-load failure, persisted via `setPackageErrors`) rather
/// than propagated.
pub async fn reconcile(
    db: &dyn DbController,
    cache: &InfoCache,
    resolver: &dyn RepositoryResolver,
    package_name: &str,
) -> Vec<String> {
    let mut errors = Vec::new();

    // 1. Load snapshot. Any failure here means we can't trust anything
    // else about this package right now — bail without touching the db.
    let package = match db.get_package(package_name).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            errors.push(format!(
                "Error getting package info: package `{}` not found",
                package_name
            ));
            return errors;
        }
        Err(e) => {
            errors.push(format!("Error getting package info: {}", e));
            return errors;
        }
    };
    let existing_versions = match db.get_versions(package_name).await {
        Ok(v) => v,
        Err(e) => {
            errors.push(format!("Error getting package info: {}", e));
            return errors;
        }
    };
    let existing_branches = match db.get_branches(package_name).await {
        Ok(b) => b,
        Err(e) => {
            errors.push(format!("Error getting package info: {}", e));
            return errors;
        }
    };
    let snapshot_refs: HashSet<String> = existing_versions
        .iter()
        .chain(existing_branches.iter())
        .map(|v| v.version.clone())
        .collect();

    // 2. Resolve the repository.
    let repo = match resolver.resolve(&package.repository).await {
        Ok(r) => r,
        Err(e) => {
            errors.push(format!("Error accessing repository: {}", e));
            let _ = db.set_package_errors(package_name, &errors).await;
            return errors;
        }
    };

    // 3. Fetch refs.
    let mut got_all = true;

    let tags = match repo.get_tags().await {
        Ok(raw_tags) => {
            let mut filtered: Vec<_> = raw_tags
                .into_iter()
                .filter_map(|(tag, commit)| version::is_release_tag(&tag).map(|v| (v, commit)))
                .collect();
            filtered.sort_by(|(a, _), (b, _)| version::compare_versions(a, b));
            filtered
        }
        Err(e) => {
            got_all = false;
            errors.push(format!("Failed to get GIT tags/branches: {}", e));
            Vec::new()
        }
    };

    let branches = match repo.get_branches().await {
        Ok(b) => b,
        Err(e) => {
            got_all = false;
            errors.push(format!("Failed to get GIT tags/branches: {}", e));
            Vec::new()
        }
    };

    let mut existing: HashSet<String> = HashSet::new();

    // 4. Admit tags, ascending.
    for (ver, commit) in tags {
        let version_str = ver.to_string();
        existing.insert(version_str.clone());
        match admit_one(db, cache, repo.as_ref(), package_name, &version_str, &commit).await {
            Ok(outcome) => {
                if outcome.is_new {
                    log::info!("Added {} v{}", package_name, version_str);
                }
            }
            Err(msg) => errors.push(format!("Version {}: {}", version_str, msg)),
        }
    }

    // 5. Admit branches.
    for (name, commit) in branches {
        let stored = format!("~{}", name);
        existing.insert(stored.clone());
        match admit_one(db, cache, repo.as_ref(), package_name, &stored, &commit).await {
            Ok(outcome) => {
                if outcome.is_new {
                    log::info!("Added {} branch {}", package_name, name);
                }
            }
            Err(msg) => errors.push(format!("Version {}: {}", stored, msg)),
        }
    }

    // 6. Prune vanished refs, only when the upstream fetch was complete.
    if got_all {
        for stale in snapshot_refs.difference(&existing) {
            match db.remove_version(package_name, stale).await {
                Ok(()) => log::info!("Removed {} {}", package_name, stale),
                Err(e) => errors.push(format!("Failed to remove {}: {}", stale, e)),
            }
        }
    }

    // 7. Persist the accumulated error list.
    let _ = db.set_package_errors(package_name, &errors).await;

    errors
}

/// Fetch `package.json` at `commit` and admit it under `ref_str`.
async fn admit_one(
    db: &dyn DbController,
    cache: &InfoCache,
    repo: &dyn Repository,
    package_name: &str,
    ref_str: &str,
    commit: &CommitInfo,
) -> Result<admission::AdmissionOutcome, String> {
    let bytes = repo
        .read_file(&commit.sha, "/package.json")
        .await
        .map_err(|e| e.to_string())?;
    let info: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    admission::admit(
        db,
        cache,
        package_name,
        ref_str,
        info,
        Some(commit.sha.clone()),
        commit.date,
    )
    .await
    .map_err(|e| e.to_string())
}
