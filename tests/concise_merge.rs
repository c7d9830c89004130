//! End-to-end tests of the concise batching state machine, driven through a
//! scripted fake VCS: content commits carry pooled metadata revisions,
//! pure-metadata batches defer or commit per configuration, conflicts
//! escalate with nothing lost, and commit failures retain pending state.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use idlemerge::config::MergeConfig;
use idlemerge::errors::MergeError;
use idlemerge::notify::{ConflictReport, ConflictSink, NullSink};
use idlemerge::orchestrator::Orchestrator;
use idlemerge::revision::{Revision, RevisionRecord};
use idlemerge::svn::Vcs;
use idlemerge::svn::driver::CommandOutput;
use idlemerge::svn::report::info::Info;
use idlemerge::svn::report::log::{NodeKind, PathAction, TouchedPath};
use idlemerge::svn::report::status::{ItemState, PropsState, Status, StatusEntry};

const SOURCE: &str = "^/foo/stable";

fn record(number: u64, author: &str, message: &str, paths: &[&str]) -> RevisionRecord {
    RevisionRecord {
        revision: Revision(number),
        author: author.to_string(),
        date: NaiveDate::from_ymd_opt(2011, 1, 1)
            .unwrap()
            .and_hms_micro_opt(1, 1, 1, 100_000)
            .unwrap(),
        message: message.to_string(),
        merge_data: String::new(),
        paths: paths
            .iter()
            .map(|path| TouchedPath {
                path: path.to_string(),
                kind: NodeKind::File,
                action: PathAction::Modified,
            })
            .collect(),
    }
}

fn modified(path: &str) -> StatusEntry {
    StatusEntry {
        path: path.to_string(),
        item: ItemState::Modified,
        props: PropsState::None,
        tree_conflicted: false,
    }
}

fn conflicted(path: &str) -> StatusEntry {
    StatusEntry {
        path: path.to_string(),
        item: ItemState::Conflicted,
        props: PropsState::None,
        tree_conflicted: false,
    }
}

/// Property-only change on the target root, the footprint of a
/// merge-tracking metadata update.
fn metadata_entry() -> StatusEntry {
    StatusEntry {
        path: ".".to_string(),
        item: ItemState::Normal,
        props: PropsState::Modified,
        tree_conflicted: false,
    }
}

/// Scripted stand-in for the svn client: merging a revision overlays its
/// scripted status entries on the working copy, committing clears it.
#[derive(Default)]
struct FakeVcs {
    eligible: Vec<u64>,
    records: BTreeMap<u64, RevisionRecord>,
    effects: BTreeMap<u64, Vec<StatusEntry>>,
    wc: BTreeMap<String, StatusEntry>,
    commits: Vec<String>,
    commit_results: VecDeque<bool>,
    reverted_paths: Vec<String>,
    record_only_merges: Vec<u64>,
    content_merges: Vec<(u64, String)>,
    revert_all_calls: usize,
}

impl FakeVcs {
    fn new() -> FakeVcs {
        FakeVcs::default()
    }

    fn revision(&mut self, record: RevisionRecord, effect: Vec<StatusEntry>) {
        let number = record.revision.0;
        self.eligible.push(number);
        self.records.insert(number, record);
        self.effects.insert(number, effect);
    }

    fn apply(&mut self, entries: &[StatusEntry]) {
        for entry in entries {
            self.wc.entry(entry.path.clone()).or_insert(entry.clone());
        }
    }
}

impl Vcs for FakeVcs {
    fn target(&self) -> &str {
        "."
    }

    fn revert_all(&mut self) -> Result<CommandOutput, MergeError> {
        self.revert_all_calls += 1;
        self.wc.clear();
        Ok(CommandOutput::default())
    }

    fn revert_paths(&mut self, paths: &[String]) -> Result<CommandOutput, MergeError> {
        for path in paths {
            self.wc.remove(path);
            self.reverted_paths.push(path.clone());
        }
        Ok(CommandOutput::default())
    }

    fn update(&mut self) -> Result<CommandOutput, MergeError> {
        Ok(CommandOutput::default())
    }

    fn status(&mut self) -> Result<Status, MergeError> {
        Ok(Status::new(self.wc.values().cloned().collect()))
    }

    fn info(&mut self, _path: &str) -> Result<Info, MergeError> {
        Ok(Info::default())
    }

    fn eligible_revisions(&mut self, _source: &str) -> Result<Vec<Revision>, MergeError> {
        Ok(self.eligible.iter().map(|&n| Revision(n)).collect())
    }

    fn load_revision(
        &mut self,
        revision: Revision,
        _branch: &str,
    ) -> Result<RevisionRecord, MergeError> {
        self.records
            .get(&revision.0)
            .cloned()
            .ok_or_else(|| MergeError::Report(format!("no scripted record for r{revision}")))
    }

    fn merge(&mut self, revision: Revision, branch: &str) -> Result<bool, MergeError> {
        self.content_merges.push((revision.0, branch.to_string()));
        let effect = self.effects.get(&revision.0).cloned().unwrap_or_default();
        self.apply(&effect);
        Ok(true)
    }

    fn merge_record_only(
        &mut self,
        revision: Revision,
        _source: &str,
    ) -> Result<bool, MergeError> {
        self.record_only_merges.push(revision.0);
        self.apply(&[metadata_entry()]);
        Ok(true)
    }

    fn resolved(&mut self, _path: &str) -> Result<bool, MergeError> {
        Ok(true)
    }

    fn commit(&mut self, message: &str) -> Result<CommandOutput, MergeError> {
        self.commits.push(message.to_string());
        let success = self.commit_results.pop_front().unwrap_or(true);
        if success {
            self.wc.clear();
            Ok(CommandOutput::default())
        } else {
            Ok(CommandOutput {
                code: 1,
                stdout: Vec::new(),
                stderr: vec!["svn: E160028: commit failed".to_string()],
            })
        }
    }

    fn remote_md5(&mut self, _url: &str, _revision: Revision) -> Result<String, MergeError> {
        Ok(String::new())
    }
}

#[derive(Default)]
struct CaptureSink {
    reports: Vec<String>,
}

impl ConflictSink for CaptureSink {
    fn notify(&mut self, report: &ConflictReport) -> Result<(), MergeError> {
        self.reports.push(report.to_string());
        Ok(())
    }
}

fn concise_config(record_only_file: Option<PathBuf>) -> MergeConfig {
    let mut config = MergeConfig::new(SOURCE, ".");
    config.single = true;
    config.concise = true;
    config.record_only_file = record_only_file;
    config
}

#[test]
fn single_content_revision_commits_with_the_expected_message() {
    let mut vcs = FakeVcs::new();
    vcs.revision(
        record(1, "foo", "log message for revision 1", &["/foo/stable/a.txt"]),
        vec![modified("a.txt")],
    );

    let mut orchestrator = Orchestrator::new(concise_config(None), vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    let commits = &orchestrator.vcs().commits;
    assert_eq!(commits.len(), 1);
    assert_eq!(
        commits[0],
        "[automerge ^/foo/stable@1] log message for revision 1\n\
         -- IDLEMERGE DATA --\n  \
         REVISIONS=1\n  \
         r1 | foo | 2011-01-01 01:01:01.100000"
    );
    assert_eq!(orchestrator.vcs().content_merges, vec![(1, SOURCE.to_string())]);
}

#[test]
fn metadata_revisions_ride_with_the_next_content_commit() {
    let dir = tempfile::tempdir().unwrap();
    let record_file = dir.path().join("records");

    let mut vcs = FakeVcs::new();
    vcs.revision(record(1, "foo", "first", &[]), vec![metadata_entry()]);
    vcs.revision(record(2, "bar", "second", &[]), vec![metadata_entry()]);
    vcs.revision(
        record(3, "baz", "the real change", &["/foo/stable/code.py"]),
        vec![modified("code.py")],
    );

    let mut orchestrator = Orchestrator::new(concise_config(Some(record_file.clone())), vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    let commits = &orchestrator.vcs().commits;
    assert_eq!(commits.len(), 1);
    assert!(commits[0].starts_with("[automerge ^/foo/stable@3] the real change\n"));
    assert!(commits[0].contains("\n  REVISIONS=3\n"));
    assert!(commits[0].contains("MERGEINFO_REVISIONS=1,2"));
    let tail: Vec<&str> = commits[0]
        .lines()
        .filter(|line| line.trim_start().starts_with('r'))
        .collect();
    assert_eq!(
        tail,
        vec![
            "  r1 | foo | 2011-01-01 01:01:01.100000",
            "  r2 | bar | 2011-01-01 01:01:01.100000",
            "  r3 | baz | 2011-01-01 01:01:01.100000",
        ]
    );

    // Everything was committed, nothing defers to the next run.
    assert_eq!(fs::read_to_string(&record_file).unwrap(), "\n");
}

#[test]
fn pure_metadata_batch_defers_to_the_record_only_file() {
    let dir = tempfile::tempdir().unwrap();
    let record_file = dir.path().join("records");
    fs::write(&record_file, "7\n").unwrap();

    let mut vcs = FakeVcs::new();
    vcs.revision(record(1, "foo", "first", &[]), vec![metadata_entry()]);
    vcs.revision(record(2, "bar", "second", &[]), vec![metadata_entry()]);

    let mut orchestrator = Orchestrator::new(concise_config(Some(record_file.clone())), vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    assert!(orchestrator.vcs().commits.is_empty());
    assert_eq!(fs::read_to_string(&record_file).unwrap(), "1,2,7\n");
}

#[test]
fn commit_mergeinfo_commits_the_pure_metadata_batch() {
    let dir = tempfile::tempdir().unwrap();
    let record_file = dir.path().join("records");

    let mut vcs = FakeVcs::new();
    vcs.revision(record(1, "foo", "first", &[]), vec![metadata_entry()]);
    vcs.revision(record(2, "bar", "second", &[]), vec![metadata_entry()]);

    let mut config = concise_config(Some(record_file.clone()));
    config.commit_mergeinfo = true;
    let mut orchestrator = Orchestrator::new(config, vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    let commits = &orchestrator.vcs().commits;
    assert_eq!(commits.len(), 1);
    assert!(commits[0].starts_with("[automerge ^/foo/stable] Committing mergeinfo changes\n"));
    assert!(commits[0].contains("MERGEINFO_REVISIONS=1,2"));
    assert_eq!(fs::read_to_string(&record_file).unwrap(), "\n");
}

#[test]
fn conflict_persists_pending_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let record_file = dir.path().join("records");
    fs::write(&record_file, "9\n").unwrap();

    let mut vcs = FakeVcs::new();
    vcs.revision(record(1, "foo", "first", &[]), vec![metadata_entry()]);
    vcs.revision(
        record(2, "alice", "breaking change", &["/foo/stable/clash.py"]),
        vec![conflicted("clash.py")],
    );

    let mut sink = CaptureSink::default();
    let mut orchestrator = Orchestrator::new(concise_config(Some(record_file.clone())), vcs);
    let code = orchestrator.launch_merge(&mut sink).unwrap();
    assert_eq!(code, 1);

    assert!(orchestrator.vcs().commits.is_empty());
    // Pending metadata and the previously persisted set are both kept.
    assert_eq!(fs::read_to_string(&record_file).unwrap(), "1,9\n");

    assert_eq!(sink.reports.len(), 1);
    let report = &sink.reports[0];
    assert!(report.starts_with(
        "MANUAL MERGE NEEDS TO BE DONE: revision 2 by alice from ^/foo/stable"
    ));
    assert!(report.contains("Pending record-only merges: 1, 9"));
    assert!(report.contains("clash.py"));
    assert!(report.contains("svn merge --accept postpone -c 2 ^/foo/stable ."));
}

#[test]
fn commit_failure_retains_pending_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let record_file = dir.path().join("records");

    let mut vcs = FakeVcs::new();
    vcs.revision(record(1, "foo", "first", &[]), vec![metadata_entry()]);
    vcs.revision(
        record(2, "bar", "flaky", &["/foo/stable/b.txt"]),
        vec![modified("b.txt")],
    );
    vcs.revision(
        record(3, "baz", "steady", &["/foo/stable/c.txt"]),
        vec![modified("c.txt")],
    );
    vcs.commit_results = VecDeque::from([false, true]);

    let mut orchestrator = Orchestrator::new(concise_config(Some(record_file.clone())), vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    let commits = &orchestrator.vcs().commits;
    assert_eq!(commits.len(), 2);
    // The failed commit named r1 as pending metadata; the retry carries it
    // into the next commit instead of dropping it.
    assert!(commits[0].contains("REVISIONS=2"));
    assert!(commits[0].contains("MERGEINFO_REVISIONS=1"));
    assert!(commits[1].contains("REVISIONS=3"));
    assert!(commits[1].contains("MERGEINFO_REVISIONS=1"));
    assert_eq!(fs::read_to_string(&record_file).unwrap(), "\n");
}

#[test]
fn record_only_revision_contributes_metadata_not_content() {
    let mut vcs = FakeVcs::new();
    vcs.revision(
        record(1, "foo", "NOMERGE local tweak", &["/foo/stable/local.py"]),
        vec![modified("local.py")],
    );
    vcs.revision(
        record(2, "bar", "real fix", &["/foo/stable/fix.py"]),
        vec![modified("fix.py")],
    );

    let mut orchestrator = Orchestrator::new(concise_config(None), vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    assert_eq!(orchestrator.vcs().record_only_merges, vec![1]);
    assert_eq!(orchestrator.vcs().content_merges.len(), 1);
    let commits = &orchestrator.vcs().commits;
    assert_eq!(commits.len(), 1);
    assert!(commits[0].contains("\n  REVISIONS=2\n"));
    assert!(commits[0].contains("MERGEINFO_REVISIONS=1"));
}

#[test]
fn spurious_changes_are_reverted_but_touched_paths_survive() {
    let mut vcs = FakeVcs::new();
    vcs.revision(
        record(1, "foo", "small change", &["/foo/stable/a.txt"]),
        vec![modified("a.txt"), modified("unrelated/churn.txt")],
    );

    let mut orchestrator = Orchestrator::new(concise_config(None), vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    let vcs = orchestrator.vcs();
    assert!(vcs.reverted_paths.contains(&"unrelated/churn.txt".to_string()));
    assert!(!vcs.reverted_paths.contains(&"a.txt".to_string()));
    assert_eq!(vcs.commits.len(), 1);
    assert!(vcs.commits[0].contains("REVISIONS=1"));
}

#[test]
fn sibling_branch_revisions_merge_from_their_own_line() {
    let mut vcs = FakeVcs::new();
    vcs.revision(
        record(
            1,
            "foo",
            "landed on a sibling",
            &["/foo/branches/hotfix/fix.py"],
        ),
        vec![modified("fix.py")],
    );

    let mut config = concise_config(None);
    config.source = "^/foo/trunk".to_string();
    let mut orchestrator = Orchestrator::new(config, vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    assert_eq!(
        orchestrator.vcs().content_merges,
        vec![(1, "^/foo/branches/hotfix".to_string())]
    );
}

#[test]
fn noop_run_commits_nothing() {
    let mut vcs = FakeVcs::new();
    vcs.revision(
        record(1, "foo", "would be committed", &["/foo/stable/a.txt"]),
        vec![modified("a.txt")],
    );

    let mut config = concise_config(None);
    config.noop = true;
    let mut orchestrator = Orchestrator::new(config, vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    let vcs = orchestrator.vcs();
    assert!(vcs.commits.is_empty());
    // One revert from the workspace reset, one after the attempted commit.
    assert_eq!(vcs.revert_all_calls, 2);
}

#[test]
fn ignored_paths_are_reverted_after_each_merge() {
    let mut vcs = FakeVcs::new();
    vcs.revision(
        record(
            1,
            "foo",
            "touches the branch config too",
            &["/foo/stable/a.txt", "/foo/stable/branch.properties"],
        ),
        vec![modified("a.txt"), modified("branch.properties")],
    );

    let mut config = concise_config(None);
    config.set_ignore_csv("branch.properties");
    let mut orchestrator = Orchestrator::new(config, vcs);
    let code = orchestrator.launch_merge(&mut NullSink).unwrap();
    assert_eq!(code, 0);

    let vcs = orchestrator.vcs();
    assert!(vcs.reverted_paths.contains(&"branch.properties".to_string()));
    assert_eq!(vcs.commits.len(), 1);
    // The ignored path was reverted before the status classification, so the
    // commit still happened on the strength of the other change.
    assert!(vcs.commits[0].contains("REVISIONS=1"));
}
