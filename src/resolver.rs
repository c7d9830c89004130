//! Mechanical resolution of a closed set of tree conflicts.
//!
//! Only conflicts whose outcome is provably identical on both sides are
//! auto-resolved: a victim deleted by both sides, or a file added on both
//! sides with byte-identical content (checked by streaming MD5, never by
//! buffering). Everything else escalates to the orchestrator untouched. The
//! resolver only ever marks conflict state; it never edits file contents.
//!
//! Return convention throughout: `true` means unresolved, escalate.

use std::fs::File;
use std::io::Read;

use md5::{Digest, Md5};

use crate::errors::MergeError;
use crate::revision::Revision;
use crate::svn::Vcs;
use crate::svn::report::info::TreeConflict;
use crate::svn::report::status::{Status, StatusEntry};

/// Walk every conflicted entry of a status snapshot, auto-resolving where
/// policy allows. Returns the entries left for manual resolution.
pub fn resolve_conflicts(
    vcs: &mut dyn Vcs,
    status: &Status,
) -> Result<Vec<StatusEntry>, MergeError> {
    let mut escalate = Vec::new();
    for entry in status.conflicted() {
        if resolve_entry(vcs, entry)? {
            escalate.push(entry.clone());
        }
    }
    Ok(escalate)
}

fn resolve_entry(vcs: &mut dyn Vcs, entry: &StatusEntry) -> Result<bool, MergeError> {
    let info = vcs.info(&entry.path)?;
    let tree_conflict = info.first().and_then(|e| e.tree_conflict.clone());
    match tree_conflict {
        Some(conflict) => resolve_tree_conflict(vcs, entry, &conflict),
        // Text and property conflicts have no mechanical resolution.
        None => Ok(true),
    }
}

fn resolve_tree_conflict(
    vcs: &mut dyn Vcs,
    entry: &StatusEntry,
    conflict: &TreeConflict,
) -> Result<bool, MergeError> {
    match (conflict.action.as_str(), conflict.reason.as_str()) {
        ("delete", "delete") => {
            // Both sides removed the victim; the merge outcome is settled.
            if vcs.resolved(&entry.path)? {
                tracing::info!(path = %entry.path, "resolved double delete conflict");
                Ok(false)
            } else {
                Ok(true)
            }
        }
        ("add", "add") if conflict.kind == "file" => {
            if identical_contents(vcs, entry, conflict)? {
                if vcs.resolved(&entry.path)? {
                    tracing::info!(path = %entry.path, "resolved double add of identical file");
                    return Ok(false);
                }
                Ok(true)
            } else {
                tracing::info!(path = %entry.path, "double add with differing contents");
                Ok(true)
            }
        }
        ("add", "add") => {
            tracing::info!(path = %entry.path, "double add of a directory, not reconciling");
            Ok(true)
        }
        ("delete", "edit") => {
            tracing::info!(
                path = %entry.path,
                "incoming delete but the file has been updated since the last merge"
            );
            Ok(true)
        }
        (action, reason) => {
            tracing::info!(
                path = %entry.path,
                action,
                reason,
                "conflict type not handled"
            );
            Ok(true)
        }
    }
}

/// Compare the incoming side of a double-add against the local file by
/// streaming both through MD5. Equality of digests is all we need; the
/// digest choice is opaque to the repository.
fn identical_contents(
    vcs: &mut dyn Vcs,
    entry: &StatusEntry,
    conflict: &TreeConflict,
) -> Result<bool, MergeError> {
    let Some(incoming) = conflict.source_right() else {
        return Ok(false);
    };
    let remote = vcs.remote_md5(&incoming.url(), Revision(incoming.revision))?;
    let local = local_md5(&entry.path)?;
    tracing::debug!(path = %entry.path, %remote, %local, "content hash compare");
    Ok(remote == local)
}

/// MD5 hex digest of a working-copy file, streamed in fixed-size chunks.
pub fn local_md5(path: &str) -> Result<String, MergeError> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
