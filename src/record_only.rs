//! Persistence of the record-only revision set across runs.
//!
//! The file is a single line of comma-separated decimal revision numbers.
//! It is the only cross-run state this tool keeps: revisions deferred as
//! metadata-only (or carried out of a conflicted batch) are written here so
//! the next run records them instead of replaying their contents.
//!
//! Both operations are best-effort reporters. A missing or unreadable file
//! loads as the empty set; a failed write is logged and must never undo a
//! commit that already happened.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use crate::revision::{Revision, join_revisions};

/// Loads and saves the record-only set at a configured path; a store without
/// a path is inert.
#[derive(Debug, Clone, Default)]
pub struct RecordOnlyStore {
    path: Option<PathBuf>,
}

impl RecordOnlyStore {
    pub fn new(path: Option<PathBuf>) -> RecordOnlyStore {
        RecordOnlyStore { path }
    }

    /// Read the persisted set. Missing file, unreadable file, and malformed
    /// fields all degrade to "not persisted" with a warning.
    pub fn load(&self) -> BTreeSet<Revision> {
        let Some(path) = &self.path else {
            return BTreeSet::new();
        };
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "cannot read record-only file");
                return BTreeSet::new();
            }
        };
        let mut revisions = BTreeSet::new();
        for field in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match field.parse::<u64>() {
                Ok(number) => {
                    revisions.insert(Revision(number));
                }
                Err(_) => {
                    tracing::warn!(path = %path.display(), field, "skipping malformed revision");
                }
            }
        }
        revisions
    }

    /// Overwrite the file with the sorted set, one line, trailing newline.
    /// Failures are logged and swallowed.
    pub fn save(&self, revisions: &BTreeSet<Revision>) {
        let Some(path) = &self.path else {
            return;
        };
        let line = join_revisions(revisions.iter(), ",");
        tracing::info!(path = %path.display(), revisions = %line, "saving record-only revisions");
        if let Err(err) = fs::write(path, format!("{line}\n")) {
            tracing::warn!(path = %path.display(), %err, "cannot write record-only file");
        }
    }
}
