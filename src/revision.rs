//! Source-branch revisions and the sibling-branch resolution rule.
//!
//! A [`Revision`] is just a number; identity, ordering, and hashing all derive
//! from it. The loaded form, [`RevisionRecord`], is an immutable value object
//! produced from one verbose log entry: author, timestamp, user message, the
//! structured merge-data tail, and the touched paths. Loading is an explicit
//! step (see [`crate::svn::Vcs::load_revision`]); record accessors are total.

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::message;
use crate::svn::report::log::{LogEntry, TouchedPath};

/// A revision number on the source branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(number: u64) -> Self {
        Revision(number)
    }
}

/// Join revisions into a separated list for logs and commit messages.
pub fn join_revisions<'a, I>(revisions: I, separator: &str) -> String
where
    I: IntoIterator<Item = &'a Revision>,
{
    revisions
        .into_iter()
        .map(|revision| revision.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Fully loaded revision data, derived from one `svn log --xml -v` entry.
#[derive(Debug, Clone)]
pub struct RevisionRecord {
    pub revision: Revision,
    pub author: String,
    /// UTC commit timestamp, microsecond precision.
    pub date: NaiveDateTime,
    /// User-written part of the commit message.
    pub message: String,
    /// Structured merge-data tail of the message, empty when absent.
    pub merge_data: String,
    pub paths: Vec<TouchedPath>,
}

impl RevisionRecord {
    pub fn from_log_entry(entry: LogEntry) -> RevisionRecord {
        let (user_message, merge_data) = message::split_message(&entry.message);
        RevisionRecord {
            revision: Revision(entry.revision),
            author: entry.author,
            date: entry.date,
            message: user_message,
            merge_data,
            paths: entry.paths,
        }
    }

    /// Branch this revision should be replayed from. Changes that landed on a
    /// sibling branch under the same project root are still eligible here and
    /// must be merged from that sibling, not from the configured source.
    pub fn effective_source(&self, configured: &str) -> String {
        effective_source(configured, &self.paths)
    }
}

fn branch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\^?(/.*?)/?(?:@[^/]*)?$").expect("error parsing branch regular expression")
    })
}

fn sibling_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(/[^/]+/(?:trunk|branches/[^/]+))(?:/|$)")
            .expect("error parsing sibling-branch regular expression")
    })
}

/// Normalize a caret source URL to its repository path: strips the leading
/// `^`, any peg revision, and a trailing slash (`^/foo/stable@99` becomes
/// `/foo/stable`).
pub fn branch_path(source: &str) -> String {
    match branch_re().captures(source) {
        Some(caps) => caps[1].to_string(),
        None => source.to_string(),
    }
}

/// Resolve the branch a set of touched paths belongs to, relative to the
/// configured source. Falls back to the configured source when no touched
/// path identifies a sibling `trunk`/`branches/<name>` line under the same
/// project root.
pub fn effective_source(configured: &str, paths: &[TouchedPath]) -> String {
    let branch = branch_path(configured);
    let branch_prefix = format!("{branch}/");
    if paths
        .iter()
        .any(|p| p.path == branch || p.path.starts_with(&branch_prefix))
    {
        return configured.to_string();
    }

    let root = project_root(&branch);
    let root_prefix = format!("{root}/");
    for touched in paths.iter().rev() {
        if !touched.path.starts_with(&root_prefix) {
            continue;
        }
        if let Some(caps) = sibling_re().captures(&touched.path) {
            return format!("^{}", &caps[1]);
        }
    }
    configured.to_string()
}

/// Strip a branch prefix from a repository-relative path, yielding the
/// working-copy-relative remainder. Paths outside the branch pass through
/// unchanged.
pub fn strip_branch_prefix(branch: &str, path: &str) -> String {
    let prefix = format!("{}/", branch_path(branch));
    match path.strip_prefix(&prefix) {
        Some(rest) => rest.to_string(),
        None => path.to_string(),
    }
}

/// First path segment of a branch path: the project root (`/foo/branches/x`
/// yields `/foo`).
fn project_root(branch: &str) -> String {
    match branch.get(1..).and_then(|rest| rest.find('/')) {
        Some(index) => branch[..index + 1].to_string(),
        None => branch.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svn::report::log::{NodeKind, PathAction};

    fn touched(path: &str) -> TouchedPath {
        TouchedPath {
            path: path.to_string(),
            kind: NodeKind::File,
            action: PathAction::Modified,
        }
    }

    #[test]
    fn revisions_order_and_display_by_number() {
        assert!(Revision(2) > Revision(1));
        assert_eq!(Revision(42).to_string(), "42");
        assert_eq!(
            join_revisions([Revision(1), Revision(2)].iter(), ", "),
            "1, 2"
        );
    }

    #[test]
    fn branch_path_strips_caret_peg_and_trailing_slash() {
        assert_eq!(branch_path("^/foo/stable"), "/foo/stable");
        assert_eq!(branch_path("^/foo/stable@123"), "/foo/stable");
        assert_eq!(branch_path("^/foo/stable/"), "/foo/stable");
        assert_eq!(branch_path("/foo/trunk"), "/foo/trunk");
    }

    #[test]
    fn effective_source_prefers_the_configured_branch() {
        let paths = vec![
            touched("/foo/branches/other/a.txt"),
            touched("/foo/stable/b.txt"),
        ];
        assert_eq!(effective_source("^/foo/stable", &paths), "^/foo/stable");
    }

    #[test]
    fn effective_source_detects_a_sibling_branch() {
        let paths = vec![
            touched("/bar/unrelated.txt"),
            touched("/foo/branches/hotfix/fix.txt"),
        ];
        assert_eq!(
            effective_source("^/foo/trunk", &paths),
            "^/foo/branches/hotfix"
        );
    }

    #[test]
    fn effective_source_picks_the_last_matching_sibling() {
        let paths = vec![
            touched("/foo/branches/first/a.txt"),
            touched("/foo/branches/second/b.txt"),
        ];
        assert_eq!(
            effective_source("^/foo/trunk", &paths),
            "^/foo/branches/second"
        );
    }

    #[test]
    fn effective_source_falls_back_without_a_recognizable_sibling() {
        let paths = vec![touched("/foo/tags/v1/a.txt"), touched("/bar/trunk/c.txt")];
        assert_eq!(effective_source("^/foo/stable", &paths), "^/foo/stable");
    }

    #[test]
    fn strip_branch_prefix_translates_to_wc_relative() {
        assert_eq!(
            strip_branch_prefix("^/foo/stable", "/foo/stable/bi/reducer.py"),
            "bi/reducer.py"
        );
        assert_eq!(
            strip_branch_prefix("^/foo/stable", "/foo/other/bi/reducer.py"),
            "/foo/other/bi/reducer.py"
        );
    }

    #[test]
    fn record_splits_user_message_from_merge_data() {
        let entry = LogEntry {
            revision: 9,
            author: "foo".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2011, 1, 1)
                .unwrap()
                .and_hms_micro_opt(1, 1, 1, 100_000)
                .unwrap(),
            message: "fix the widget\n-- IDLEMERGE DATA --\n  REVISIONS=7\n".to_string(),
            paths: vec![touched("/foo/stable/widget.py")],
        };
        let record = RevisionRecord::from_log_entry(entry);
        assert_eq!(record.revision, Revision(9));
        assert_eq!(record.message, "fix the widget");
        assert!(record.merge_data.contains("REVISIONS=7"));
    }
}
