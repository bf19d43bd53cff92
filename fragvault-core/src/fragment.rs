use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::policy::PolicyPair;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("fragment path is empty")]
    Empty,
    #[error("fragment path contains unsupported segment: {0}")]
    UnsupportedSegment(String),
}

/// One immutable snapshot of a fragment. `content_digest` is `None` for a
/// directory marker or a soft-deleted fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentVersion {
    pub id: i64,
    pub fragment_id: i64,
    pub sequence: i64,
    pub content_digest: Option<String>,
}

/// A node of the path-addressed tree, as loaded together with its latest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: i64,
    pub path: String,
    pub depth: i64,
    pub latest_version: Option<FragmentVersion>,
    pub policy: PolicyPair,
}

impl Fragment {
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// A fragment without versions, or whose latest version carries no content.
    pub fn is_directory(&self) -> bool {
        self.latest_version
            .as_ref()
            .is_none_or(|version| version.content_digest.is_none())
    }

    pub fn latest_sequence(&self) -> Option<i64> {
        self.latest_version.as_ref().map(|version| version.sequence)
    }
}

/// Trims surrounding slashes and rejects empty, `.` and `..` segments.
pub fn normalize_path(raw: &str) -> Result<String, PathError> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(PathError::UnsupportedSegment(segment.to_string()));
        }
    }
    Ok(trimmed.to_string())
}

pub fn path_depth(path: &str) -> i64 {
    path.split('/').count() as i64
}

pub fn join_path(base: &str, relative: &str) -> String {
    format!("{base}/{relative}")
}

/// Returns the part of `path` below `base`, or `None` when `path` is not a descendant.
pub fn relative_to<'a>(base: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(base)?
        .strip_prefix('/')
        .filter(|rest| !rest.is_empty())
}

pub fn content_digest(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;

    fn fragment(latest: Option<Option<&str>>) -> Fragment {
        Fragment {
            id: 1,
            path: "root/b/c.txt".into(),
            depth: 3,
            latest_version: latest.map(|digest| FragmentVersion {
                id: 7,
                fragment_id: 1,
                sequence: 0,
                content_digest: digest.map(str::to_string),
            }),
            policy: PolicyPair::new(Policy::Users, Policy::Users),
        }
    }

    #[test]
    fn normalize_trims_slashes() {
        assert_eq!(normalize_path("/root/b/").unwrap(), "root/b");
    }

    #[test]
    fn normalize_rejects_traversal_and_empty_segments() {
        assert_eq!(normalize_path("//"), Err(PathError::Empty));
        assert!(matches!(
            normalize_path("root/../etc"),
            Err(PathError::UnsupportedSegment(segment)) if segment == ".."
        ));
        assert!(normalize_path("root//b").is_err());
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(path_depth("root"), 1);
        assert_eq!(path_depth("root/b/c.txt"), 3);
    }

    #[test]
    fn relative_to_requires_separator() {
        assert_eq!(relative_to("root", "root/a.txt"), Some("a.txt"));
        assert_eq!(relative_to("root", "rootless/a.txt"), None);
        assert_eq!(relative_to("root", "root"), None);
    }

    #[test]
    fn directory_means_no_content() {
        assert!(fragment(None).is_directory());
        assert!(fragment(Some(None)).is_directory());
        assert!(!fragment(Some(Some("abc"))).is_directory());
        assert_eq!(fragment(None).name(), "c.txt");
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            content_digest(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
