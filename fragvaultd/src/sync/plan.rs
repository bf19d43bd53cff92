use std::collections::HashSet;

use fragvault_core::{ArchiveEntries, Fragment, join_path, relative_to};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction<'a> {
    /// Existing fragment gets a new version carrying the entry's content.
    Update {
        fragment: &'a Fragment,
        content: Option<&'a [u8]>,
    },
    /// Existing fragment whose path vanished from the archive.
    SoftDelete { fragment: &'a Fragment },
    /// Directory that is still a directory; nothing to record.
    Skip { fragment: &'a Fragment },
    Create {
        path: String,
        content: Option<&'a [u8]>,
    },
}

impl SyncAction<'_> {
    pub fn path(&self) -> &str {
        match self {
            SyncAction::Update { fragment, .. }
            | SyncAction::SoftDelete { fragment }
            | SyncAction::Skip { fragment } => &fragment.path,
            SyncAction::Create { path, .. } => path,
        }
    }

    pub fn existing(&self) -> Option<&Fragment> {
        match self {
            SyncAction::Update { fragment, .. }
            | SyncAction::SoftDelete { fragment }
            | SyncAction::Skip { fragment } => Some(fragment),
            SyncAction::Create { .. } => None,
        }
    }

    pub fn mutates_existing(&self) -> bool {
        matches!(
            self,
            SyncAction::Update { .. } | SyncAction::SoftDelete { .. }
        )
    }
}

/// Diffs the decoded archive against the fragments already stored below
/// `base`. Existing fragments come first in store order, then creations in
/// entry order, so parents are created before their children.
pub fn plan_sync<'a>(
    base: &str,
    entries: &'a ArchiveEntries,
    existing: &'a [Fragment],
) -> Vec<SyncAction<'a>> {
    let mut actions = Vec::with_capacity(existing.len() + entries.len());
    let mut known: HashSet<&str> = HashSet::with_capacity(existing.len());

    for fragment in existing {
        let Some(relative) = relative_to(base, &fragment.path) else {
            continue;
        };
        known.insert(relative);
        let action = match entries.get(relative) {
            Some(None) if fragment.is_directory() => SyncAction::Skip { fragment },
            Some(content) => SyncAction::Update {
                fragment,
                content: content.as_deref(),
            },
            None => SyncAction::SoftDelete { fragment },
        };
        actions.push(action);
    }

    for (relative, content) in entries {
        if !known.contains(relative.as_str()) {
            actions.push(SyncAction::Create {
                path: join_path(base, relative),
                content: content.as_deref(),
            });
        }
    }

    actions
}
