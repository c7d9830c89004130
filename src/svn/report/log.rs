//! View over `svn log --xml -v` output for a single revision.

use std::str::FromStr;

use chrono::NaiveDateTime;

use super::{child, child_text, parse_document, parse_svn_date, required_attr};
use crate::errors::MergeError;

/// Node kind of a touched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

impl FromStr for NodeKind {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // Older servers omit the kind attribute entirely.
            "file" | "" => Ok(NodeKind::File),
            "dir" => Ok(NodeKind::Dir),
            other => Err(MergeError::Report(format!("unknown node kind `{other}`"))),
        }
    }
}

/// Action recorded against a touched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAction {
    Added,
    Modified,
    Deleted,
    Replaced,
}

impl FromStr for PathAction {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(PathAction::Added),
            "M" => Ok(PathAction::Modified),
            "D" => Ok(PathAction::Deleted),
            "R" => Ok(PathAction::Replaced),
            other => Err(MergeError::Report(format!("unknown path action `{other}`"))),
        }
    }
}

/// One `<path>` element of a verbose log entry: a repository-relative path
/// together with its node kind and the action applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchedPath {
    pub path: String,
    pub kind: NodeKind,
    pub action: PathAction,
}

/// A parsed `<logentry>`.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub revision: u64,
    pub author: String,
    pub date: NaiveDateTime,
    /// Full commit message as stored, including any structured tail.
    pub message: String,
    pub paths: Vec<TouchedPath>,
}

impl LogEntry {
    /// Parse the first `<logentry>` of a `<log>` document.
    pub fn parse(xml: &str) -> Result<LogEntry, MergeError> {
        let doc = parse_document(xml)?;
        let root = doc.root_element();
        let entry = child(&root, "logentry")
            .ok_or_else(|| MergeError::Report("log report has no <logentry>".to_string()))?;

        let revision: u64 = required_attr(&entry, "revision")?
            .parse()
            .map_err(|_| MergeError::Report("non-numeric log revision".to_string()))?;
        let date = child_text(&entry, "date")
            .ok_or_else(|| MergeError::Report("log entry has no <date>".to_string()))?;

        let mut paths = Vec::new();
        if let Some(container) = child(&entry, "paths") {
            for node in container.children().filter(|n| n.has_tag_name("path")) {
                paths.push(TouchedPath {
                    path: node.text().unwrap_or("").to_string(),
                    kind: node.attribute("kind").unwrap_or("").parse()?,
                    action: required_attr(&node, "action")?.parse()?,
                });
            }
        }

        Ok(LogEntry {
            revision,
            author: child_text(&entry, "author").unwrap_or_default(),
            date: parse_svn_date(&date)?,
            message: child_text(&entry, "msg").unwrap_or_default(),
            paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<log>
<logentry revision="36317">
<author>ravi</author>
<date>2012-01-27T02:08:20.565277Z</date>
<paths>
<path kind="file" action="M">/trunk/bi/reducer_uid_session.py</path>
<path kind="dir" action="A">/trunk/bi/jobs</path>
<path kind="file" action="D">/trunk/bi/old.py</path>
</paths>
<msg>change of uge test</msg>
</logentry>
</log>"#;

    #[test]
    fn parses_verbose_log_entry() {
        let entry = LogEntry::parse(SAMPLE).unwrap();
        assert_eq!(entry.revision, 36317);
        assert_eq!(entry.author, "ravi");
        assert_eq!(entry.message, "change of uge test");
        assert_eq!(entry.paths.len(), 3);
        assert_eq!(
            entry.paths[0],
            TouchedPath {
                path: "/trunk/bi/reducer_uid_session.py".to_string(),
                kind: NodeKind::File,
                action: PathAction::Modified,
            }
        );
        assert_eq!(entry.paths[1].kind, NodeKind::Dir);
        assert_eq!(entry.paths[2].action, PathAction::Deleted);
    }

    #[test]
    fn tolerates_missing_author_and_message() {
        let xml = r#"<log><logentry revision="7">
<date>2011-01-01T01:01:01.100000Z</date>
</logentry></log>"#;
        let entry = LogEntry::parse(xml).unwrap();
        assert_eq!(entry.revision, 7);
        assert_eq!(entry.author, "");
        assert_eq!(entry.message, "");
        assert!(entry.paths.is_empty());
    }

    #[test]
    fn missing_logentry_is_a_report_error() {
        assert!(matches!(
            LogEntry::parse("<log></log>"),
            Err(MergeError::Report(_))
        ));
    }
}
