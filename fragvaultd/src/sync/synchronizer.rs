use fragvault_core::{
    ArchiveError, ArchiveReader, Capability, Fragment, FragmentVersion, PathError, PolicyPair,
    Viewer, ZipArchiveReader, can, normalize_path,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::plan::{SyncAction, plan_sync};
use crate::store::{FragmentStore, StoreError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid base path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("unable to read archive for {path}: {reason}")]
    ArchiveReadFailure { path: String, reason: String },
    #[error("store transaction failed: {0}")]
    StoreTransactionFailure(#[from] StoreError),
    #[error("paths collide with fragments the viewer cannot see: {}", paths.join(", "))]
    AmbiguousPathConflict { paths: Vec<String> },
    #[error("viewer may not {capability} fragment {path}")]
    PermissionDenied {
        path: String,
        capability: Capability,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub created_files: usize,
    pub created_directories: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped_directories: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub root_version: FragmentVersion,
    pub counts: SyncCounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The archive was expanded into the subtree.
    Complete(SyncReport),
    /// Only the root received the archive; the format could not be expanded.
    Degraded {
        root_version: FragmentVersion,
        reason: String,
    },
}

impl SyncOutcome {
    pub fn root_version(&self) -> &FragmentVersion {
        match self {
            SyncOutcome::Complete(report) => &report.root_version,
            SyncOutcome::Degraded { root_version, .. } => root_version,
        }
    }

    pub fn expansion_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Degraded { .. })
    }
}

pub struct Synchronizer<S, R = ZipArchiveReader> {
    store: S,
    reader: R,
}

impl<S: FragmentStore> Synchronizer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            reader: ZipArchiveReader::default(),
        }
    }
}

impl<S: FragmentStore, R: ArchiveReader> Synchronizer<S, R> {
    pub fn with_reader(store: S, reader: R) -> Self {
        Self { store, reader }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stores `archive` as the newest version of `base_path`, then mirrors
    /// its entries into the fragments below it.
    ///
    /// Access to every affected descendant is checked before the root is
    /// written. An unreadable archive or a store error during expansion
    /// leaves the root version in place.
    pub async fn synchronize(
        &self,
        viewer: &Viewer,
        base_path: &str,
        archive: &[u8],
        policy: &PolicyPair,
    ) -> Result<SyncOutcome, SyncError> {
        let base = normalize_path(base_path)?;
        let root = self.prepare_root(viewer, &base, policy).await?;

        let entries = match self.reader.read_entries(archive) {
            Ok(entries) => entries,
            Err(ArchiveError::Unsupported(reason)) => {
                let root_version = self.store_root_version(&root, archive).await?;
                warn!(path = %base, %reason, "archive not expanded");
                return Ok(SyncOutcome::Degraded {
                    root_version,
                    reason,
                });
            }
            Err(ArchiveError::Read(reason)) => {
                self.store_root_version(&root, archive).await?;
                warn!(path = %base, %reason, "archive stored but unreadable");
                return Err(SyncError::ArchiveReadFailure { path: base, reason });
            }
        };

        let existing = self.store.query_by_prefix(&base).await?;
        let plan = plan_sync(&base, &entries, &existing);
        check_access(viewer, &existing, &plan)?;

        let root_version = self.store_root_version(&root, archive).await?;
        let counts = self.apply(&plan, &root.policy).await?;
        info!(
            path = %base,
            created_files = counts.created_files,
            created_directories = counts.created_directories,
            updated = counts.updated,
            deleted = counts.deleted,
            skipped = counts.skipped_directories,
            "archive synchronized"
        );
        Ok(SyncOutcome::Complete(SyncReport {
            root_version,
            counts,
        }))
    }

    async fn store_root_version(
        &self,
        root: &Fragment,
        archive: &[u8],
    ) -> Result<FragmentVersion, SyncError> {
        let root_version = self.store.append_version(root.id, Some(archive)).await?;
        info!(
            path = %root.path,
            sequence = root_version.sequence,
            bytes = archive.len(),
            "stored archive as root version"
        );
        Ok(root_version)
    }

    async fn prepare_root(
        &self,
        viewer: &Viewer,
        base: &str,
        policy: &PolicyPair,
    ) -> Result<Fragment, SyncError> {
        match self.store.fragment_by_path(base).await? {
            Some(root) => {
                if !can(Capability::View, &root.policy, viewer) {
                    return Err(SyncError::AmbiguousPathConflict {
                        paths: vec![root.path],
                    });
                }
                if !can(Capability::Edit, &root.policy, viewer) {
                    return Err(SyncError::PermissionDenied {
                        path: root.path,
                        capability: Capability::Edit,
                    });
                }
                Ok(root)
            }
            None => {
                debug!(path = %base, "creating root fragment");
                Ok(self.store.create_fragment(base, policy).await?)
            }
        }
    }

    async fn apply(
        &self,
        plan: &[SyncAction<'_>],
        inherited: &PolicyPair,
    ) -> Result<SyncCounts, SyncError> {
        let mut counts = SyncCounts::default();
        for action in plan {
            match action {
                SyncAction::Update { fragment, content } => {
                    self.store.append_version(fragment.id, *content).await?;
                    debug!(path = %fragment.path, directory = content.is_none(), "updated fragment");
                    counts.updated += 1;
                }
                SyncAction::SoftDelete { fragment } => {
                    self.store.append_version(fragment.id, None).await?;
                    debug!(path = %fragment.path, "soft-deleted fragment");
                    counts.deleted += 1;
                }
                SyncAction::Skip { .. } => counts.skipped_directories += 1,
                SyncAction::Create { path, content } => {
                    let created = self.store.create_fragment(path, inherited).await?;
                    match content {
                        Some(data) => {
                            self.store.append_version(created.id, Some(*data)).await?;
                            counts.created_files += 1;
                        }
                        None => counts.created_directories += 1,
                    }
                    debug!(path = %path, "created fragment");
                }
            }
        }
        Ok(counts)
    }
}

/// Every existing descendant must be visible, and every one the plan
/// touches must be editable, before anything below the root is written.
fn check_access(
    viewer: &Viewer,
    existing: &[Fragment],
    plan: &[SyncAction<'_>],
) -> Result<(), SyncError> {
    let hidden: Vec<String> = existing
        .iter()
        .filter(|fragment| !can(Capability::View, &fragment.policy, viewer))
        .map(|fragment| fragment.path.clone())
        .collect();
    if !hidden.is_empty() {
        return Err(SyncError::AmbiguousPathConflict { paths: hidden });
    }

    let touched = plan
        .iter()
        .filter(|action| action.mutates_existing())
        .filter_map(SyncAction::existing);
    for fragment in touched {
        if !can(Capability::Edit, &fragment.policy, viewer) {
            return Err(SyncError::PermissionDenied {
                path: fragment.path.clone(),
                capability: Capability::Edit,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "synchronizer_tests.rs"]
mod tests;
