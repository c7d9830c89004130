//! Classification of revisions that must not have their contents replayed.
//!
//! A record-only revision still gets its number written into the target's
//! merge-tracking metadata (so it never comes back as eligible) but its
//! textual changes are skipped. Classification is pure: membership in the
//! persisted record-only set, or any configured literal pattern occurring in
//! the user message. Patterns are substrings, not regexes, and are matched
//! against the user message only, never the structured tail.

use std::collections::BTreeSet;

use crate::revision::{Revision, RevisionRecord};

/// Message markers that exclude a revision from content propagation.
pub const DEFAULT_NO_MERGE_PATTERNS: &[&str] = &[
    "maven-release-plugin",
    "NOMERGE",
    "NO-MERGE",
    "NO MERGE",
    "NO_MERGE",
];

/// True when the revision must be propagated as metadata only.
pub fn is_record_only(
    record: &RevisionRecord,
    patterns: &[String],
    persisted: &BTreeSet<Revision>,
) -> bool {
    if persisted.contains(&record.revision) {
        return true;
    }
    patterns
        .iter()
        .any(|pattern| record.message.contains(pattern))
}
