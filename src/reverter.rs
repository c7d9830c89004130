//! Pruning of spurious working-copy churn after a replay.
//!
//! Merging a single revision can dirty paths the revision never touched,
//! an artifact of merge-tracking metadata propagating to ancestor
//! directories. Everything outside the revision's own touched paths (plus
//! whatever earlier revisions in the batch legitimized) gets reverted so
//! commits stay minimal. The legitimate set threads through the batch: each
//! replay adds its touched paths, and the target root is always legitimate.

use std::collections::BTreeSet;

use crate::revision::{RevisionRecord, strip_branch_prefix};
use crate::svn::report::status::Status;

/// Result of one partition pass: the paths to revert and the grown
/// legitimate set to carry into the next replay.
#[derive(Debug, Clone)]
pub struct SpuriousChanges {
    pub to_revert: Vec<String>,
    pub legitimate: BTreeSet<String>,
}

/// Split the current status into legitimate and spurious changes.
///
/// Touched paths are translated from repository-relative to working-copy
/// paths by stripping the effective source branch prefix and re-rooting at
/// the target. Unversioned entries are never reverted.
pub fn partition_spurious(
    record: &RevisionRecord,
    effective_source: &str,
    target: &str,
    status: &Status,
    legitimate: &BTreeSet<String>,
) -> SpuriousChanges {
    let mut legitimate = legitimate.clone();
    legitimate.insert(target.to_string());
    for touched in &record.paths {
        let relative = strip_branch_prefix(effective_source, &touched.path);
        legitimate.insert(wc_path(target, &relative));
    }

    let to_revert: Vec<String> = status
        .entries
        .iter()
        .filter(|entry| !entry.is_unversioned() && !legitimate.contains(&entry.path))
        .map(|entry| entry.path.clone())
        .collect();

    SpuriousChanges {
        to_revert,
        legitimate,
    }
}

/// Re-root a working-copy-relative path under the target directory.
pub(crate) fn wc_path(target: &str, relative: &str) -> String {
    if target == "." || target.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", target.trim_end_matches('/'), relative)
    }
}
