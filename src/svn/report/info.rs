//! View over `svn info --xml` output, including tree-conflict descriptions.

use std::collections::BTreeSet;

use super::{child, child_text, parse_document, required_attr};
use crate::errors::MergeError;

/// One side of a tree conflict (`<version>` element).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictVersion {
    pub side: String,
    pub kind: String,
    pub path_in_repos: String,
    pub repos_url: String,
    pub revision: u64,
}

impl ConflictVersion {
    /// Absolute repository URL of this side's file.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.repos_url.trim_end_matches('/'),
            self.path_in_repos
        )
    }
}

/// A `<tree-conflict>` block attached to an info entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConflict {
    pub operation: String,
    pub action: String,
    pub reason: String,
    pub kind: String,
    pub victim: String,
    pub versions: Vec<ConflictVersion>,
}

impl TreeConflict {
    pub fn source_left(&self) -> Option<&ConflictVersion> {
        self.versions.iter().find(|v| v.side == "source-left")
    }

    pub fn source_right(&self) -> Option<&ConflictVersion> {
        self.versions.iter().find(|v| v.side == "source-right")
    }
}

/// One `<entry>` of the info report.
#[derive(Debug, Clone)]
pub struct InfoEntry {
    pub path: String,
    pub kind: String,
    pub url: String,
    pub repo_root: String,
    pub tree_conflict: Option<TreeConflict>,
}

impl InfoEntry {
    /// Repository-relative path in caret notation (`^/trunk`), falling back
    /// to the raw URL when the root does not prefix it.
    pub fn repo_path(&self) -> String {
        let root = self.repo_root.trim_end_matches('/');
        match self.url.strip_prefix(root) {
            Some(rest) if !root.is_empty() => format!("^{rest}"),
            _ => self.url.clone(),
        }
    }
}

/// Full info report, one entry per queried path.
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub entries: Vec<InfoEntry>,
}

impl Info {
    /// Build from already-decoded entries, deduplicating by path (first
    /// occurrence wins).
    pub fn new(entries: Vec<InfoEntry>) -> Info {
        let mut seen = BTreeSet::new();
        let entries = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.path.clone()))
            .collect();
        Info { entries }
    }

    pub fn parse(xml: &str) -> Result<Info, MergeError> {
        let doc = parse_document(xml)?;
        let mut entries = Vec::new();
        for entry in doc
            .root_element()
            .children()
            .filter(|n| n.has_tag_name("entry"))
        {
            let tree_conflict = match child(&entry, "tree-conflict") {
                Some(node) => {
                    let mut versions = Vec::new();
                    for version in node.children().filter(|n| n.has_tag_name("version")) {
                        versions.push(ConflictVersion {
                            side: version.attribute("side").unwrap_or("").to_string(),
                            kind: version.attribute("kind").unwrap_or("").to_string(),
                            path_in_repos: version
                                .attribute("path-in-repos")
                                .unwrap_or("")
                                .to_string(),
                            repos_url: version.attribute("repos-url").unwrap_or("").to_string(),
                            revision: version
                                .attribute("revision")
                                .unwrap_or("0")
                                .parse()
                                .map_err(|_| {
                                    MergeError::Report(
                                        "non-numeric tree-conflict revision".to_string(),
                                    )
                                })?,
                        });
                    }
                    Some(TreeConflict {
                        operation: node.attribute("operation").unwrap_or("").to_string(),
                        action: required_attr(&node, "action")?.to_string(),
                        reason: required_attr(&node, "reason")?.to_string(),
                        kind: node.attribute("kind").unwrap_or("").to_string(),
                        victim: node.attribute("victim").unwrap_or("").to_string(),
                        versions,
                    })
                }
                None => None,
            };
            entries.push(InfoEntry {
                path: required_attr(&entry, "path")?.to_string(),
                kind: entry.attribute("kind").unwrap_or("").to_string(),
                url: child_text(&entry, "url").unwrap_or_default(),
                repo_root: child(&entry, "repository")
                    .and_then(|repo| child_text(&repo, "root"))
                    .unwrap_or_default(),
                tree_conflict,
            });
        }
        Ok(Info::new(entries))
    }

    pub fn first(&self) -> Option<&InfoEntry> {
        self.entries.first()
    }
}
