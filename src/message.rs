//! Commit-message construction and the machine-parseable merge-data block.
//!
//! Every commit this tool produces carries a structured tail so later runs
//! (and humans) can recover which revisions were propagated as content and
//! which as merge-tracking metadata only:
//!
//! ```text
//! [automerge ^/foo/stable@1] log message for revision 1
//! -- IDLEMERGE DATA --
//!   REVISIONS=1
//!   r1 | foo | 2011-01-01 01:01:01.100000
//! ```
//!
//! `REVISIONS=` lists content revisions, `MERGEINFO_REVISIONS=` lists
//! metadata-only revisions; a number appears in at most one of the two, and
//! the `r<n>` lines enumerate their union in ascending order.

use crate::errors::MergeError;
use crate::revision::{Revision, RevisionRecord, join_revisions};

/// Literal line separating the user message from the structured tail.
pub const MERGE_DATA_MARKER: &str = "-- IDLEMERGE DATA --";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Split a full commit message on the first marker line. Returns the user
/// message and the raw tail; either may be empty.
pub fn split_message(full: &str) -> (String, String) {
    let leading = format!("{MERGE_DATA_MARKER}\n");
    if let Some(rest) = full.strip_prefix(&leading) {
        return (String::new(), rest.to_string());
    }
    let needle = format!("\n{MERGE_DATA_MARKER}\n");
    if let Some(pos) = full.find(&needle) {
        return (
            full[..pos].to_string(),
            full[pos + needle.len()..].to_string(),
        );
    }
    (full.to_string(), String::new())
}

/// Revision lists recovered from a merge-data block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeData {
    pub revisions: Vec<Revision>,
    pub mergeinfo_revisions: Vec<Revision>,
}

impl MergeData {
    /// Parse the tail of a commit message (with or without the marker line).
    pub fn parse(block: &str) -> Result<MergeData, MergeError> {
        let mut data = MergeData::default();
        for line in block.lines() {
            let line = line.trim();
            if line == MERGE_DATA_MARKER {
                continue;
            }
            if let Some(csv) = line.strip_prefix("REVISIONS=") {
                data.revisions = parse_revision_csv(csv)?;
            } else if let Some(csv) = line.strip_prefix("MERGEINFO_REVISIONS=") {
                data.mergeinfo_revisions = parse_revision_csv(csv)?;
            }
        }
        Ok(data)
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty() && self.mergeinfo_revisions.is_empty()
    }
}

fn parse_revision_csv(csv: &str) -> Result<Vec<Revision>, MergeError> {
    csv.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .parse::<u64>()
                .map(Revision)
                .map_err(|_| MergeError::Report(format!("invalid revision number `{field}`")))
        })
        .collect()
}

/// Render the merge-data block for the given content and metadata-only
/// revisions. Lines after the first are indented two spaces so the block
/// nests under the commit subject.
pub fn merge_data_block(revisions: &[&RevisionRecord], mergeinfo: &[&RevisionRecord]) -> String {
    let mut lines = vec![MERGE_DATA_MARKER.to_string()];
    if !revisions.is_empty() {
        let mut numbers: Vec<Revision> = revisions.iter().map(|r| r.revision).collect();
        numbers.sort();
        lines.push(format!("REVISIONS={}", join_revisions(numbers.iter(), ",")));
    }
    if !mergeinfo.is_empty() {
        let mut numbers: Vec<Revision> = mergeinfo.iter().map(|r| r.revision).collect();
        numbers.sort();
        lines.push(format!(
            "MERGEINFO_REVISIONS={}",
            join_revisions(numbers.iter(), ",")
        ));
    }
    let mut all: Vec<&&RevisionRecord> = revisions.iter().chain(mergeinfo.iter()).collect();
    all.sort_by_key(|record| record.revision);
    for record in all {
        lines.push(format!(
            "r{} | {} | {}",
            record.revision,
            record.author,
            record.date.format(DATE_FORMAT)
        ));
    }
    lines.join("\n  ")
}

/// Build the full commit log: subject plus merge-data block.
///
/// Subject selection:
/// - exactly one content revision (any number of metadata revisions), or no
///   content and exactly one metadata revision: `[automerge <source>@<n>]
///   <user message>`;
/// - no content and several metadata revisions: `[automerge <source>]
///   Committing mergeinfo changes`;
/// - several content revisions: `merge revisions <csv> from <source> to
///   <target repo path>`.
pub fn commit_log(
    source: &str,
    target_repo_path: &str,
    revisions: &[&RevisionRecord],
    mergeinfo: &[&RevisionRecord],
) -> Result<String, MergeError> {
    if revisions.is_empty() && mergeinfo.is_empty() {
        return Err(MergeError::Message("no revision provided".to_string()));
    }
    if revisions
        .iter()
        .any(|r| mergeinfo.iter().any(|m| m.revision == r.revision))
    {
        return Err(MergeError::Message(
            "a revision cannot be both content and metadata-only".to_string(),
        ));
    }

    let subject = if revisions.len() == 1 {
        single_revision_subject(source, revisions[0])
    } else if revisions.is_empty() && mergeinfo.len() == 1 {
        single_revision_subject(source, mergeinfo[0])
    } else if revisions.is_empty() {
        format!("[automerge {source}] Committing mergeinfo changes")
    } else {
        let mut numbers: Vec<Revision> = revisions.iter().map(|r| r.revision).collect();
        numbers.sort();
        format!(
            "merge revisions {} from {} to {}",
            join_revisions(numbers.iter(), ", "),
            source,
            target_repo_path
        )
    };
    Ok(format!(
        "{subject}\n{}",
        merge_data_block(revisions, mergeinfo)
    ))
}

fn single_revision_subject(source: &str, record: &RevisionRecord) -> String {
    format!(
        "[automerge {}@{}] {}",
        source,
        record.revision,
        record.message.trim_end()
    )
}
