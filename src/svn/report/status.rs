//! View over `svn status --xml` output.
//!
//! The two derived predicates drive the batch state machine: `has_conflict`
//! decides escalation, `has_real_changes` decides whether a replay produced a
//! committable diff or only merge-tracking metadata churn (property-only
//! changes report `item="normal"` and therefore do not count).

use std::collections::BTreeSet;
use std::str::FromStr;

use super::{child, parse_document, required_attr};
use crate::errors::MergeError;

/// State of the item itself in the working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Added,
    Conflicted,
    Deleted,
    External,
    Ignored,
    Incomplete,
    Merged,
    Missing,
    Modified,
    None,
    Normal,
    Obstructed,
    Replaced,
    Unversioned,
}

impl FromStr for ItemState {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ItemState::Added),
            "conflicted" => Ok(ItemState::Conflicted),
            "deleted" => Ok(ItemState::Deleted),
            "external" => Ok(ItemState::External),
            "ignored" => Ok(ItemState::Ignored),
            "incomplete" => Ok(ItemState::Incomplete),
            "merged" => Ok(ItemState::Merged),
            "missing" => Ok(ItemState::Missing),
            "modified" => Ok(ItemState::Modified),
            "none" => Ok(ItemState::None),
            "normal" => Ok(ItemState::Normal),
            "obstructed" => Ok(ItemState::Obstructed),
            "replaced" => Ok(ItemState::Replaced),
            "unversioned" => Ok(ItemState::Unversioned),
            other => Err(MergeError::Report(format!("unknown item state `{other}`"))),
        }
    }
}

/// State of the item's properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropsState {
    None,
    Normal,
    Modified,
    Conflicted,
}

impl FromStr for PropsState {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PropsState::None),
            "normal" => Ok(PropsState::Normal),
            "modified" => Ok(PropsState::Modified),
            "conflicted" => Ok(PropsState::Conflicted),
            other => Err(MergeError::Report(format!("unknown props state `{other}`"))),
        }
    }
}

/// One `<entry>` of the status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub item: ItemState,
    pub props: PropsState,
    pub tree_conflicted: bool,
}

impl StatusEntry {
    pub fn has_conflict(&self) -> bool {
        self.tree_conflicted
            || self.item == ItemState::Conflicted
            || self.props == PropsState::Conflicted
    }

    pub fn has_real_changes(&self) -> bool {
        self.has_conflict()
            || !matches!(
                self.item,
                ItemState::Normal | ItemState::Unversioned | ItemState::None
            )
    }

    pub fn is_unversioned(&self) -> bool {
        self.item == ItemState::Unversioned
    }
}

/// Full status snapshot of the working copy.
#[derive(Debug, Clone, Default)]
pub struct Status {
    pub entries: Vec<StatusEntry>,
}

impl Status {
    /// Build from already-decoded entries, deduplicating by path (first
    /// occurrence wins). Used by the XML parser and by test doubles.
    pub fn new(entries: Vec<StatusEntry>) -> Status {
        let mut seen = BTreeSet::new();
        let entries = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.path.clone()))
            .collect();
        Status { entries }
    }

    pub fn parse(xml: &str) -> Result<Status, MergeError> {
        let doc = parse_document(xml)?;
        let mut entries = Vec::new();
        for target in doc
            .root_element()
            .children()
            .filter(|n| n.has_tag_name("target"))
        {
            for entry in target.children().filter(|n| n.has_tag_name("entry")) {
                let wc_status = child(&entry, "wc-status").ok_or_else(|| {
                    MergeError::Report("status entry has no <wc-status>".to_string())
                })?;
                entries.push(StatusEntry {
                    path: required_attr(&entry, "path")?.to_string(),
                    item: required_attr(&wc_status, "item")?.parse()?,
                    props: required_attr(&wc_status, "props")?.parse()?,
                    tree_conflicted: wc_status.attribute("tree-conflicted") == Some("true"),
                });
            }
        }
        Ok(Status::new(entries))
    }

    pub fn conflicted(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|entry| entry.has_conflict())
    }

    pub fn unversioned(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|entry| entry.is_unversioned())
    }

    pub fn has_conflict(&self) -> bool {
        self.conflicted().next().is_some()
    }

    pub fn has_real_changes(&self) -> bool {
        self.entries.iter().any(StatusEntry::has_real_changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<status>
<target path=".">
<entry path="bi/reducer.py">
<wc-status item="modified" props="none" revision="431"/>
</entry>
<entry path="merge_file">
<wc-status item="missing" props="none" tree-conflicted="true"/>
</entry>
<entry path="scratch.txt">
<wc-status item="unversioned" props="none"/>
</entry>
<entry path=".">
<wc-status item="normal" props="modified" revision="431"/>
</entry>
</target>
</status>"#;

    #[test]
    fn parses_entries_and_predicates() {
        let status = Status::parse(SAMPLE).unwrap();
        assert_eq!(status.entries.len(), 4);
        assert!(status.has_conflict());
        assert!(status.has_real_changes());
        let conflicted: Vec<_> = status.conflicted().map(|e| e.path.as_str()).collect();
        assert_eq!(conflicted, vec!["merge_file"]);
        let unversioned: Vec<_> = status.unversioned().map(|e| e.path.as_str()).collect();
        assert_eq!(unversioned, vec!["scratch.txt"]);
    }

    #[test]
    fn property_only_changes_are_not_real_changes() {
        let status = Status::new(vec![StatusEntry {
            path: ".".to_string(),
            item: ItemState::Normal,
            props: PropsState::Modified,
            tree_conflicted: false,
        }]);
        assert!(!status.has_real_changes());
        assert!(!status.has_conflict());
    }

    #[test]
    fn unversioned_entries_are_not_real_changes() {
        let status = Status::new(vec![StatusEntry {
            path: "junk".to_string(),
            item: ItemState::Unversioned,
            props: PropsState::None,
            tree_conflicted: false,
        }]);
        assert!(!status.has_real_changes());
    }

    #[test]
    fn duplicate_paths_keep_first_occurrence() {
        let status = Status::new(vec![
            StatusEntry {
                path: "a".to_string(),
                item: ItemState::Modified,
                props: PropsState::None,
                tree_conflicted: false,
            },
            StatusEntry {
                path: "a".to_string(),
                item: ItemState::Normal,
                props: PropsState::None,
                tree_conflicted: false,
            },
        ]);
        assert_eq!(status.entries.len(), 1);
        assert_eq!(status.entries[0].item, ItemState::Modified);
    }

    #[test]
    fn conflicted_properties_escalate() {
        let entry = StatusEntry {
            path: "dir".to_string(),
            item: ItemState::Normal,
            props: PropsState::Conflicted,
            tree_conflicted: false,
        };
        assert!(entry.has_conflict());
    }
}
