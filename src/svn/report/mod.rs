//! Typed views over the XML reports emitted by `svn --xml` subcommands.
//!
//! Each view parses eagerly into owned structs at construction and fails with
//! [`MergeError::Report`] on malformed input. Views that aggregate entries
//! deduplicate by path, first occurrence wins.

pub mod info;
pub mod log;
pub mod status;

use chrono::NaiveDateTime;
use roxmltree::{Document, Node};

use crate::errors::MergeError;

/// Parse an svn UTC timestamp (`2012-01-27T02:08:20.565277Z`, the fractional
/// part is optional) into a naive datetime with microsecond precision.
pub fn parse_svn_date(raw: &str) -> Result<NaiveDateTime, MergeError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ"))
        .map_err(|err| MergeError::Report(format!("invalid svn date `{raw}`: {err}")))
}

pub(crate) fn parse_document(xml: &str) -> Result<Document<'_>, MergeError> {
    Document::parse(xml).map_err(|err| MergeError::Report(format!("invalid xml: {err}")))
}

pub(crate) fn required_attr<'a>(node: &Node<'a, '_>, name: &str) -> Result<&'a str, MergeError> {
    node.attribute(name).ok_or_else(|| {
        MergeError::Report(format!(
            "<{}> is missing the `{name}` attribute",
            node.tag_name().name()
        ))
    })
}

pub(crate) fn child<'a, 'i>(parent: &Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    parent.children().find(|node| node.has_tag_name(name))
}

pub(crate) fn child_text(parent: &Node<'_, '_>, name: &str) -> Option<String> {
    child(parent, name).map(|node| node.text().unwrap_or("").to_string())
}
