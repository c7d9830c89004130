//! Error types for the idlemerge crate.
//!
//! This module defines a unified error enumeration used across the process
//! driver, the XML report views, the merge orchestrator, and persistence. It
//! integrates with `thiserror` to provide rich `Display` implementations and
//! error source chaining where applicable.
//!
//! A raised `Conflict` is data, not a bug: it carries everything needed to
//! notify the responsible author and to persist the pending metadata-only
//! revisions for the next run.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::revision::Revision;
use crate::svn::report::status::StatusEntry;

#[derive(Error, Debug)]
/// Unified error enumeration for the idlemerge library.
pub enum MergeError {
    /// Missing or malformed configuration (required source URL, bad CSV, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// The post-cleanup update of the working copy failed; no merge may run.
    #[error("failed to reset workspace: {0}")]
    WorkspaceReset(String),

    /// I/O error from a child process stream or the local filesystem.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// An `svn --xml` report did not parse into the expected shape.
    #[error("malformed report: {0}")]
    Report(String),

    /// A VCS invocation failed in a way the orchestrator cannot work around.
    #[error("svn {command} failed with exit code {code}: {detail}")]
    Svn {
        command: String,
        code: i32,
        detail: String,
    },

    /// The commit message builder was given nothing to describe.
    #[error("cannot build commit message: {0}")]
    Message(String),

    /// One or more conflicts survived auto-resolution; manual action needed.
    #[error("{0}")]
    Conflict(Box<Conflict>),

    /// A merge mode that is declared but not supported by this build.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// Payload of an unresolved merge conflict.
///
/// `mergeinfos` is the union of the batch's pending metadata-only revisions
/// and the record-only set persisted by earlier runs; it is written back to
/// the record-only file so nothing in flight is lost across runs. `merges`
/// lists revisions that were cleanly replayed in the batch but not yet
/// committed when the conflict struck.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub revision: Revision,
    pub author: String,
    pub mergeinfos: BTreeSet<Revision>,
    pub merges: Vec<Revision>,
    pub source: String,
    pub target: String,
    /// Working-copy status snapshot taken when the conflict was raised.
    pub entries: Vec<StatusEntry>,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MANUAL MERGE NEEDS TO BE DONE: revision {} by {} from {}",
            self.revision, self.author, self.source
        )?;
        if !self.mergeinfos.is_empty() {
            let pending: Vec<String> = self.mergeinfos.iter().map(|r| r.to_string()).collect();
            write!(f, "\nPending record-only merges: {}", pending.join(", "))?;
        }
        if !self.merges.is_empty() {
            let merges: Vec<String> = self.merges.iter().map(|r| r.to_string()).collect();
            write!(f, "\nPending clean merges: {}", merges.join(", "))?;
        }
        Ok(())
    }
}
