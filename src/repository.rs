//! Repository Capability — consumed, not owned, by the core.
//!
//! The core only ever talks to this trait; concrete host adapters (GitHub,
//! GitLab, Bitbucket HTTP clients) are left to callers. [`GitRepository`] is
//! the one reference adapter shipped here: a generic, host-agnostic adapter
//! over the plain git wire protocol, useful both for local/self-hosted
//! repositories and for tests.

use crate::errors::RepositoryError;
use crate::models::{CommitInfo, RepositoryDescriptor};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Abstract remote VCS capability.
#[async_trait]
pub trait Repository: Send + Sync {
    /// List all tags with their commit metadata.
    async fn get_tags(&self) -> Result<Vec<(String, CommitInfo)>, RepositoryError>;
    /// List all branches with their commit metadata.
    async fn get_branches(&self) -> Result<Vec<(String, CommitInfo)>, RepositoryError>;
    /// Read the bytes of a file at a given commit.
    async fn read_file(&self, sha: &str, path: &str) -> Result<Vec<u8>, RepositoryError>;
    /// Construct the download URL for a given ref.
    fn get_download_url(&self, ref_str: &str) -> String;
}

/// A reference [`Repository`] adapter backed by a local `git2::Repository`.
///
/// Construct it over a bare clone (or working checkout) already present on
/// disk — cloning/fetching a remote into that location is left to the
/// caller; only the capability's interface, not its transport, belongs in
/// the core.
pub struct GitRepository {
    path: PathBuf,
    download_url_template: String,
}

impl GitRepository {
    /// `download_url_template` may contain `{ref}`, substituted per call.
    pub fn open<P: AsRef<Path>>(path: P, download_url_template: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            download_url_template: download_url_template.into(),
        }
    }
}

fn commit_info(commit: &git2::Commit) -> CommitInfo {
    let sha = commit.id().to_string();
    let date = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now);
    CommitInfo { sha, date }
}

#[async_trait]
impl Repository for GitRepository {
    async fn get_tags(&self) -> Result<Vec<(String, CommitInfo)>, RepositoryError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<_, RepositoryError> {
            let repo = git2::Repository::open(&path)?;
            let mut out = Vec::new();
            for name in repo.tag_names(None)?.iter().flatten() {
                let refname = format!("refs/tags/{}", name);
                let obj = repo.revparse_single(&refname)?;
                let commit = match obj.peel_to_commit() {
                    Ok(c) => c,
                    Err(_) => continue,
                };
                out.push((name.to_string(), commit_info(&commit)));
            }
            Ok(out)
        })
        .await
        .map_err(|e| RepositoryError::Other(e.to_string()))?
    }

    async fn get_branches(&self) -> Result<Vec<(String, CommitInfo)>, RepositoryError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<_, RepositoryError> {
            let repo = git2::Repository::open(&path)?;
            let mut out = Vec::new();
            for branch in repo.branches(Some(git2::BranchType::Local))? {
                let (branch, _) = branch?;
                let name = match branch.name()? {
                    Some(n) => n.to_string(),
                    None => continue,
                };
                let commit = branch.get().peel_to_commit()?;
                out.push((name, commit_info(&commit)));
            }
            Ok(out)
        })
        .await
        .map_err(|e| RepositoryError::Other(e.to_string()))?
    }

    async fn read_file(&self, sha: &str, path: &str) -> Result<Vec<u8>, RepositoryError> {
        let repo_path = self.path.clone();
        let sha = sha.to_string();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, RepositoryError> {
            let repo = git2::Repository::open(&repo_path)?;
            let oid = git2::Oid::from_str(&sha)?;
            let commit = repo.find_commit(oid)?;
            let tree = commit.tree()?;
            let entry = tree
                .get_path(Path::new(path.trim_start_matches('/')))
                .map_err(|_| RepositoryError::Other(format!("`{}` not found at `{}`", path, sha)))?;
            let blob = repo.find_blob(entry.id())?;
            Ok(blob.content().to_vec())
        })
        .await
        .map_err(|e| RepositoryError::Other(e.to_string()))?
    }

    fn get_download_url(&self, ref_str: &str) -> String {
        self.download_url_template.replace("{ref}", ref_str)
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.path)
            .finish()
    }
}

/// Resolves a package's opaque [`RepositoryDescriptor`] into a live
/// [`Repository`] handle.
///
/// This keeps host-specific adapters (GitHub/GitLab/Bitbucket HTTP clients)
/// out of the core: real deployments supply their own resolver that
/// dispatches on the descriptor's variant to the right host adapter
/// (possibly cloning a remote first); [`LocalGitResolver`] below is the one
/// shipped here, for self-hosted/bare repositories and tests.
#[async_trait]
pub trait RepositoryResolver: Send + Sync {
    async fn resolve(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> Result<Arc<dyn Repository>, RepositoryError>;
}

/// Resolves `RepositoryDescriptor::Git { url }` by treating `url` as an
/// already-present local path (a bare clone, a working tree, or a tagged
/// remote fetched out-of-band) and opening it with [`GitRepository`].
pub struct LocalGitResolver {
    download_url_template: String,
}

impl LocalGitResolver {
    pub fn new(download_url_template: impl Into<String>) -> Self {
        Self {
            download_url_template: download_url_template.into(),
        }
    }
}

#[async_trait]
impl RepositoryResolver for LocalGitResolver {
    async fn resolve(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        let RepositoryDescriptor::Git { url } = descriptor;
        Ok(Arc::new(GitRepository::open(url, self.download_url_template.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    /// Build a tiny throwaway git repo with one tag and one branch, for
    /// exercising the adapter without network access.
    fn make_test_repo(dir: &Path) -> String {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir)
                .status()
                .expect("git binary available");
            assert!(status.success(), "git {:?} failed", args);
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.join("package.json"), br#"{"name":"foo"}"#).unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);
        run(&["tag", "v0.1.0"]);
        let out = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir)
            .output()
            .unwrap();
        String::from_utf8(out.stdout).unwrap().trim().to_string()
    }

    #[tokio::test]
    async fn lists_tags_and_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let sha = make_test_repo(dir.path());

        let repo = GitRepository::open(dir.path(), "https://example.com/dl/{ref}");
        let tags = repo.get_tags().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].0, "v0.1.0");

        let bytes = repo.read_file(&sha, "/package.json").await.unwrap();
        assert_eq!(bytes, br#"{"name":"foo"}"#);
    }

    #[test]
    fn download_url_substitutes_ref() {
        let repo = GitRepository::open(".", "https://example.com/dl/{ref}");
        assert_eq!(repo.get_download_url("v1.0.0"), "https://example.com/dl/v1.0.0");
    }
}
