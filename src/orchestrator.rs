//! The per-revision merge loop and its concise batching variant.
//!
//! One run: reset the working copy to pristine, ask the VCS which source
//! revisions are still eligible, then replay them strictly in ascending
//! order. In concise mode, revisions whose replay produces only
//! merge-tracking metadata are pooled and ride along with the next content
//! commit; a batch that is metadata from end to end is either committed as
//! one mergeinfo commit or deferred to the record-only file for the next run.
//!
//! Failure discipline: everything that can go wrong inside a single
//! replay is either worked around locally or surfaces as a typed
//! [`Conflict`], the only user-visible escalation. The conflict carries the
//! pending metadata set so no in-flight revision is lost across runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::config::MergeConfig;
use crate::errors::{Conflict, MergeError};
use crate::message;
use crate::notify::{ConflictReport, ConflictSink};
use crate::policy;
use crate::record_only::RecordOnlyStore;
use crate::resolver;
use crate::reverter;
use crate::revision::{Revision, RevisionRecord, join_revisions};
use crate::svn::Vcs;

/// Drives a whole merge run against one source/target pair.
pub struct Orchestrator<V: Vcs> {
    config: MergeConfig,
    vcs: V,
    store: RecordOnlyStore,
    records: BTreeMap<Revision, RevisionRecord>,
    target_repo_path: Option<String>,
}

/// How one inner pass over the batch ended.
enum PassOutcome {
    /// A content commit was attempted; these revisions leave the batch.
    Committed { merged: Vec<Revision> },
    /// Every remaining revision produced metadata-only effects.
    AllMetadata,
}

impl<V: Vcs> Orchestrator<V> {
    pub fn new(config: MergeConfig, vcs: V) -> Orchestrator<V> {
        let store = RecordOnlyStore::new(config.record_only_file.clone());
        Orchestrator {
            config,
            vcs,
            store,
            records: BTreeMap::new(),
            target_repo_path: None,
        }
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Run the whole merge. Returns the process exit code: 0 when the batch
    /// drained cleanly, 1 when a conflict was raised and reported.
    pub fn launch_merge(&mut self, sink: &mut dyn ConflictSink) -> Result<i32, MergeError> {
        self.reset_workspace()?;
        let eligible = self.vcs.eligible_revisions(&self.config.source)?;
        tracing::info!(count = eligible.len(), "merging {} revisions", eligible.len());

        let outcome = if self.config.single {
            if self.config.concise {
                self.merge_one_by_one_concise(&eligible)
            } else {
                self.merge_one_by_one(&eligible)
            }
        } else {
            Err(MergeError::NotImplemented(
                "only --single merge passes are supported".to_string(),
            ))
        };

        match outcome {
            Ok(()) => {
                tracing::info!("done merging");
                Ok(0)
            }
            Err(MergeError::Conflict(conflict)) => {
                let report = ConflictReport::new(*conflict);
                println!("{}", report.banner());
                self.store.save(&report.conflict.mergeinfos);
                sink.notify(&report)?;
                Ok(1)
            }
            Err(err) => Err(err),
        }
    }

    /// Bring the working copy back to pristine: recursive revert, update,
    /// delete unversioned entries, update again. A failing second update
    /// means the workspace cannot be trusted and the run aborts.
    fn reset_workspace(&mut self) -> Result<(), MergeError> {
        self.vcs.revert_all()?;
        self.vcs.update()?;

        let status = self.vcs.status()?;
        let unversioned: Vec<String> = status.unversioned().map(|e| e.path.clone()).collect();
        if unversioned.is_empty() {
            return Ok(());
        }
        for path in &unversioned {
            remove_entry(Path::new(path))?;
        }
        tracing::info!(count = unversioned.len(), "removed unversioned entries");

        let update = self.vcs.update()?;
        if !update.success() {
            return Err(MergeError::WorkspaceReset(format!(
                "update exited with code {} after unversioned cleanup",
                update.code
            )));
        }
        Ok(())
    }

    /// Load (once) the verbose log record of a revision.
    fn record(&mut self, revision: Revision) -> Result<RevisionRecord, MergeError> {
        if let Some(record) = self.records.get(&revision) {
            return Ok(record.clone());
        }
        let record = self.vcs.load_revision(revision, &self.config.source)?;
        self.records.insert(revision, record.clone());
        Ok(record)
    }

    /// Caret-notation repository path of the target, for multi-revision
    /// commit subjects. One info call per run.
    fn target_repo_path(&mut self) -> Result<String, MergeError> {
        if let Some(path) = &self.target_repo_path {
            return Ok(path.clone());
        }
        let target = self.vcs.target().to_string();
        let info = self.vcs.info(&target)?;
        let path = info
            .first()
            .map(|entry| entry.repo_path())
            .unwrap_or(target);
        self.target_repo_path = Some(path.clone());
        Ok(path)
    }

    /// Replay one revision: a metadata-only merge for record-only revisions,
    /// otherwise a content merge pinned to the revision's effective source
    /// branch. Ignored paths are reverted after any successful merge.
    fn replay(
        &mut self,
        record: &RevisionRecord,
        persisted: &BTreeSet<Revision>,
    ) -> Result<bool, MergeError> {
        let revision = record.revision;
        let ok = if policy::is_record_only(record, &self.config.no_merge_patterns, persisted) {
            tracing::info!(revision = %revision, "record-only merge");
            self.vcs.merge_record_only(revision, &self.config.source)?
        } else {
            let branch = record.effective_source(&self.config.source);
            if branch != self.config.source {
                tracing::info!(revision = %revision, %branch, "replaying from sibling branch");
            }
            self.vcs.merge(revision, &branch)?
        };
        if ok && !self.config.ignore_paths.is_empty() {
            let paths: Vec<String> = self
                .config
                .ignore_paths
                .iter()
                .map(|path| reverter::wc_path(&self.config.target, path))
                .collect();
            tracing::debug!(paths = %paths.join(" "), "reverting ignored paths");
            self.vcs.revert_paths(&paths)?;
        }
        Ok(ok)
    }

    /// Dry single-stepping: every revision is replayed but nothing is ever
    /// committed and conflicts are not raised; the working copy is the only
    /// outcome. Per-revision failures are reported and iteration continues.
    fn merge_one_by_one(&mut self, revisions: &[Revision]) -> Result<(), MergeError> {
        let persisted = self.store.load();
        for &revision in revisions {
            let record = self.record(revision)?;
            if !self.replay(&record, &persisted)? {
                tracing::warn!(revision = %revision, "merge reported an error, continuing");
            }
        }
        Ok(())
    }

    /// Concise batching: pool metadata-only replays until a content commit
    /// carries them, defer them to the record-only file when no content
    /// commit ever comes.
    fn merge_one_by_one_concise(&mut self, revisions: &[Revision]) -> Result<(), MergeError> {
        tracing::info!("merging one by one, concise mode");
        let persisted = self.store.load();
        if !persisted.is_empty() {
            tracing::info!(
                revisions = %join_revisions(persisted.iter(), ","),
                "record-only revisions from previous runs"
            );
        }

        let mut to_merge: Vec<Revision> = revisions.to_vec();
        let mut pending: Vec<Revision> = Vec::new();
        let mut legitimate: BTreeSet<String> = BTreeSet::from([self.config.target.clone()]);

        while !to_merge.is_empty() {
            tracing::info!(revisions = %join_revisions(to_merge.iter(), ", "), "merging batch");
            match self.concise_pass(&to_merge, &mut pending, &mut legitimate, &persisted)? {
                PassOutcome::Committed { merged } => {
                    to_merge.retain(|revision| !merged.contains(revision));
                }
                PassOutcome::AllMetadata => {
                    if self.config.commit_mergeinfo {
                        if !pending.is_empty() {
                            let log = self.commit_log_for(None, &pending)?;
                            tracing::info!("{log}");
                            if self.commit(&log)? {
                                pending.clear();
                            }
                        }
                        break;
                    }
                    tracing::info!(
                        revisions = %join_revisions(to_merge.iter(), ","),
                        "only mergeinfo changes left, deferring to the next run"
                    );
                    let mut deferred: BTreeSet<Revision> = pending.iter().copied().collect();
                    deferred.extend(persisted.iter().copied());
                    self.store.save(&deferred);
                    return Ok(());
                }
            }
        }

        self.store.save(&pending.iter().copied().collect());
        Ok(())
    }

    /// One pass over the batch. Stops at the first content commit (the
    /// committed revisions leave the batch) or when the batch runs dry on
    /// metadata-only replays. An unresolved conflict aborts the run.
    fn concise_pass(
        &mut self,
        to_merge: &[Revision],
        pending: &mut Vec<Revision>,
        legitimate: &mut BTreeSet<String>,
        persisted: &BTreeSet<Revision>,
    ) -> Result<PassOutcome, MergeError> {
        for &revision in to_merge {
            let record = self.record(revision)?;
            self.replay(&record, persisted)?;

            let status = self.vcs.status()?;
            let escalated = resolver::resolve_conflicts(&mut self.vcs, &status)?;
            if !escalated.is_empty() {
                tracing::warn!(
                    revision = %revision,
                    count = escalated.len(),
                    "conflicts left for manual resolution"
                );
            }

            let status = self.vcs.status()?;
            let branch = record.effective_source(&self.config.source);
            let spurious = reverter::partition_spurious(
                &record,
                &branch,
                &self.config.target,
                &status,
                legitimate,
            );
            if !spurious.to_revert.is_empty() {
                tracing::info!(
                    revision = %revision,
                    paths = %spurious.to_revert.join(" "),
                    "reverting spurious merges"
                );
                self.vcs.revert_paths(&spurious.to_revert)?;
            }
            *legitimate = spurious.legitimate;

            let status = self.vcs.status()?;
            if status.has_conflict() {
                let mut mergeinfos: BTreeSet<Revision> = pending.iter().copied().collect();
                mergeinfos.extend(persisted.iter().copied());
                return Err(MergeError::Conflict(Box::new(Conflict {
                    revision,
                    author: record.author.clone(),
                    mergeinfos,
                    merges: Vec::new(),
                    source: self.config.source.clone(),
                    target: self.config.target.clone(),
                    entries: status.entries,
                })));
            }
            if status.has_real_changes() {
                let mut merged = pending.clone();
                merged.push(revision);
                let log = self.commit_log_for(Some(revision), pending)?;
                tracing::info!("{log}");
                if self.commit(&log)? {
                    pending.clear();
                } else {
                    tracing::error!(
                        revision = %revision,
                        "commit failed, retaining pending metadata revisions"
                    );
                }
                return Ok(PassOutcome::Committed { merged });
            }
            pending.push(revision);
        }
        Ok(PassOutcome::AllMetadata)
    }

    fn commit_log_for(
        &mut self,
        content: Option<Revision>,
        metadata: &[Revision],
    ) -> Result<String, MergeError> {
        let target_repo = self.target_repo_path()?;
        let content_records: Vec<RevisionRecord> = match content {
            Some(revision) => vec![self.record(revision)?],
            None => Vec::new(),
        };
        let metadata_records: Vec<RevisionRecord> = metadata
            .iter()
            .map(|&revision| self.record(revision))
            .collect::<Result<_, _>>()?;
        let content_refs: Vec<&RevisionRecord> = content_records.iter().collect();
        let metadata_refs: Vec<&RevisionRecord> = metadata_records.iter().collect();
        message::commit_log(
            &self.config.source,
            &target_repo,
            &content_refs,
            &metadata_refs,
        )
    }

    /// Commit the target. In noop mode nothing is committed: the attempt is
    /// logged, the working copy reverted, and success reported so batching
    /// proceeds. A real nonzero commit exit is a value; the caller keeps its
    /// pending state.
    fn commit(&mut self, log: &str) -> Result<bool, MergeError> {
        if self.config.noop {
            tracing::info!("noop: skipping commit");
            self.vcs.revert_all()?;
            return Ok(true);
        }
        let output = self.vcs.commit(log)?;
        if output.success() {
            for line in &output.stdout {
                tracing::info!("{line}");
            }
        } else {
            tracing::error!(
                code = output.code,
                stderr = %output.stderr.join("\n"),
                "commit failed"
            );
        }
        Ok(output.success())
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    let file_type = fs::symlink_metadata(path)?.file_type();
    if file_type.is_dir() && !file_type.is_symlink() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
