//! Version Classifier.
//!
//! Distinguishes branch refs (`~name`) from release refs (valid semver),
//! and orders releases via `semver`'s own `Ord` impl.

use semver::Version;
use std::cmp::Ordering;

/// A classified ref, as admitted into a package's `versions`/`branches`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ref {
    /// A release version, e.g. `1.2.3`. Stored without the `v` prefix.
    Release(Version),
    /// A branch name, without the leading `~`.
    Branch(String),
}

/// Classification error: `~~` is reserved, and a non-`~` ref must parse as
/// semver or it isn't a ref this engine understands at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("malformed branch ref `{0}`: `~~` prefix is reserved")]
    DoubleTilde(String),
    #[error("not a valid semver release: `{0}`")]
    NotSemver(String),
}

/// Classify a stored ref string (already `v`-stripped for releases, per
/// the Reconciler's own convention).
pub fn classify(ref_str: &str) -> Result<Ref, ClassifyError> {
    if let Some(rest) = ref_str.strip_prefix('~') {
        if rest.starts_with('~') {
            return Err(ClassifyError::DoubleTilde(ref_str.to_string()));
        }
        return Ok(Ref::Branch(rest.to_string()));
    }
    Version::parse(ref_str)
        .map(Ref::Release)
        .map_err(|_| ClassifyError::NotSemver(ref_str.to_string()))
}

/// True iff `tag` (e.g. `v1.2.3`) starts with `v` and the remainder is
/// valid semver. Used by the Reconciler (§4.G step 3) to filter tags.
pub fn is_release_tag(tag: &str) -> Option<Version> {
    let rest = tag.strip_prefix('v')?;
    Version::parse(rest).ok()
}

/// Total order over two release versions, ascending.
pub fn compare_versions(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_branch() {
        assert_eq!(classify("~master").unwrap(), Ref::Branch("master".into()));
    }

    #[test]
    fn rejects_double_tilde() {
        assert!(matches!(
            classify("~~master"),
            Err(ClassifyError::DoubleTilde(_))
        ));
    }

    #[test]
    fn classifies_release() {
        assert_eq!(
            classify("1.2.3").unwrap(),
            Ref::Release(Version::parse("1.2.3").unwrap())
        );
    }

    #[test]
    fn rejects_non_semver() {
        assert!(matches!(classify("not-a-version"), Err(ClassifyError::NotSemver(_))));
    }

    #[test]
    fn tag_filtering_requires_v_prefix() {
        assert_eq!(
            is_release_tag("v1.0.0"),
            Some(Version::parse("1.0.0").unwrap())
        );
        assert_eq!(is_release_tag("1.0.0"), None);
        assert_eq!(is_release_tag("version-1.0.0"), None);
    }

    #[test]
    fn versions_sort_ascending() {
        let mut versions: Vec<Version> = vec!["1.2.0", "1.0.0", "1.10.0", "1.2.0-alpha"]
            .into_iter()
            .map(|v| Version::parse(v).unwrap())
            .collect();
        versions.sort_by(compare_versions);
        assert_eq!(
            versions.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
            vec!["1.0.0", "1.2.0-alpha", "1.2.0", "1.10.0"]
        );
    }
}
