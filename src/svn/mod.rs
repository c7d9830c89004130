//! The Subversion command surface.
//!
//! [`Vcs`] is the seam between the merge orchestration logic and the real
//! `svn` binary: the orchestrator, resolver, and reverter only ever talk to
//! this trait, so tests drive them with scripted doubles instead of a live
//! repository. [`SvnClient`] is the production implementation, spawning one
//! child per operation through [`driver`] with a fixed non-interactive
//! preamble.

pub mod driver;
pub mod report;

use std::io::{self, Read};
use std::sync::OnceLock;

use md5::{Digest, Md5};
use regex::Regex;

use crate::errors::MergeError;
use crate::revision::{Revision, RevisionRecord};
use crate::svn::driver::{CommandOutput, PASSWORD_PLACEHOLDER};
use crate::svn::report::info::Info;
use crate::svn::report::log::LogEntry;
use crate::svn::report::status::Status;

/// Leading stderr tag of the one error worth retrying: a merge into a
/// mixed-revision working copy, cured by an update.
const MIXED_REVISION_ERROR: &str = "svn: E195020";

/// Total attempts for a merge interrupted by the mixed-revision race.
const MERGE_ATTEMPTS: u32 = 3;

/// Optional credentials injected into every invocation.
#[derive(Debug, Clone)]
pub struct SvnAuth {
    pub username: String,
    pub password: Option<String>,
}

/// Operations the merge machinery needs from the version-control system.
///
/// A `false` return from the merge operations means the command failed in a
/// non-retryable way; the failure has already been logged and the caller
/// decides whether to continue. Nonzero commit exits are values on
/// [`CommandOutput`] so the batch loop can retain state and move on.
pub trait Vcs {
    /// Working-copy root all operations apply to.
    fn target(&self) -> &str;

    /// `revert -R` on the target.
    fn revert_all(&mut self) -> Result<CommandOutput, MergeError>;

    /// `revert` on an explicit list of working-copy paths.
    fn revert_paths(&mut self, paths: &[String]) -> Result<CommandOutput, MergeError>;

    /// `update --ignore-externals` on the target.
    fn update(&mut self) -> Result<CommandOutput, MergeError>;

    /// `status --ignore-externals --xml` on the target.
    fn status(&mut self) -> Result<Status, MergeError>;

    /// `info --xml` on an arbitrary path (target or conflict victim).
    fn info(&mut self, path: &str) -> Result<Info, MergeError>;

    /// Revisions on `source` not yet reflected in the target's
    /// merge-tracking metadata, ascending.
    fn eligible_revisions(&mut self, source: &str) -> Result<Vec<Revision>, MergeError>;

    /// Load the verbose log entry of one revision from `branch`.
    fn load_revision(
        &mut self,
        revision: Revision,
        branch: &str,
    ) -> Result<RevisionRecord, MergeError>;

    /// Content merge of a single revision from `branch`, pinned to the
    /// revision's own peg. Retries the mixed-revision race internally.
    fn merge(&mut self, revision: Revision, branch: &str) -> Result<bool, MergeError>;

    /// Metadata-only merge of a single revision from the configured source.
    fn merge_record_only(&mut self, revision: Revision, source: &str)
    -> Result<bool, MergeError>;

    /// `resolved` on a conflict victim. Marks state only.
    fn resolved(&mut self, path: &str) -> Result<bool, MergeError>;

    /// `commit -m` on the target. Nonzero exit is a value, not an error.
    fn commit(&mut self, message: &str) -> Result<CommandOutput, MergeError>;

    /// Stream the repository-side file at `url@revision` through an MD5
    /// digest and return the hex digest. Never buffers the file.
    fn remote_md5(&mut self, url: &str, revision: Revision) -> Result<String, MergeError>;
}

/// Production [`Vcs`] implementation backed by the `svn` binary.
pub struct SvnClient {
    target: String,
    auth: Option<SvnAuth>,
}

impl SvnClient {
    pub fn new(target: impl Into<String>, auth: Option<SvnAuth>) -> SvnClient {
        SvnClient {
            target: target.into(),
            auth,
        }
    }

    fn password(&self) -> Option<&str> {
        self.auth.as_ref().and_then(|auth| auth.password.as_deref())
    }

    /// Full argument vector: fixed preamble, credentials with the password
    /// placeholder, then the caller's arguments.
    fn command(&self, args: &[&str]) -> Vec<String> {
        let mut command = vec!["svn".to_string(), "--non-interactive".to_string()];
        if let Some(auth) = &self.auth {
            command.push("--username".to_string());
            command.push(auth.username.clone());
            if auth.password.is_some() {
                command.push("--password".to_string());
                command.push(PASSWORD_PLACEHOLDER.to_string());
            }
        }
        command.extend(args.iter().map(|arg| arg.to_string()));
        command
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, MergeError> {
        driver::execute(&self.command(args), false, self.password())
    }

    /// Run a command whose XML output we must parse; nonzero exit is fatal
    /// here because there is nothing to parse.
    fn run_report(&self, args: &[&str]) -> Result<String, MergeError> {
        let output = self.run(args)?;
        if !output.success() {
            return Err(MergeError::Svn {
                command: args.first().map(|s| s.to_string()).unwrap_or_default(),
                code: output.code,
                detail: output.stderr.join("\n"),
            });
        }
        Ok(output.stdout.join("\n"))
    }
}

fn eligible_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^r(\d+)$").expect("error parsing revision regular expression"))
}

/// Extract revision numbers from `mergeinfo --show-revs eligible` output.
fn parse_eligible(lines: &[String]) -> Vec<Revision> {
    let mut revisions: Vec<Revision> = lines
        .iter()
        .filter_map(|line| eligible_re().captures(line.trim()))
        .filter_map(|caps| caps[1].parse::<u64>().ok().map(Revision))
        .collect();
    revisions.sort();
    revisions
}

impl Vcs for SvnClient {
    fn target(&self) -> &str {
        &self.target
    }

    fn revert_all(&mut self) -> Result<CommandOutput, MergeError> {
        let target = self.target.clone();
        self.run(&["revert", "-R", &target])
    }

    fn revert_paths(&mut self, paths: &[String]) -> Result<CommandOutput, MergeError> {
        let mut args = vec!["revert"];
        args.extend(paths.iter().map(String::as_str));
        self.run(&args)
    }

    fn update(&mut self) -> Result<CommandOutput, MergeError> {
        let target = self.target.clone();
        self.run(&["update", "--ignore-externals", &target])
    }

    fn status(&mut self) -> Result<Status, MergeError> {
        let target = self.target.clone();
        let xml = self.run_report(&["status", "--ignore-externals", "--xml", &target])?;
        Status::parse(&xml)
    }

    fn info(&mut self, path: &str) -> Result<Info, MergeError> {
        let xml = self.run_report(&["info", "--xml", path])?;
        Info::parse(&xml)
    }

    fn eligible_revisions(&mut self, source: &str) -> Result<Vec<Revision>, MergeError> {
        let target = self.target.clone();
        let output = self.run(&["mergeinfo", "--show-revs", "eligible", source, &target])?;
        if !output.success() {
            return Err(MergeError::Svn {
                command: "mergeinfo".to_string(),
                code: output.code,
                detail: output.stderr.join("\n"),
            });
        }
        Ok(parse_eligible(&output.stdout))
    }

    fn load_revision(
        &mut self,
        revision: Revision,
        branch: &str,
    ) -> Result<RevisionRecord, MergeError> {
        let rev = revision.to_string();
        let xml = self.run_report(&["log", "--xml", "-v", "-r", &rev, branch])?;
        Ok(RevisionRecord::from_log_entry(LogEntry::parse(&xml)?))
    }

    fn merge(&mut self, revision: Revision, branch: &str) -> Result<bool, MergeError> {
        let change = revision.to_string();
        let source = format!("{branch}@{revision}");
        let target = self.target.clone();
        let mut attempts = 0;
        let output = loop {
            attempts += 1;
            let output = self.run(&[
                "merge",
                "--accept",
                "postpone",
                "-c",
                &change,
                &source,
                &target,
            ])?;
            if !output.success()
                && output.first_stderr().starts_with(MIXED_REVISION_ERROR)
                && attempts < MERGE_ATTEMPTS
            {
                tracing::warn!(
                    attempt = attempts,
                    "mixed-revision working copy, updating and retrying merge"
                );
                self.update()?;
                continue;
            }
            break output;
        };
        if !output.success() {
            tracing::warn!(
                revision = %revision,
                stderr = %output.stderr.join("\n"),
                "merge failed"
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn merge_record_only(
        &mut self,
        revision: Revision,
        source: &str,
    ) -> Result<bool, MergeError> {
        let change = revision.to_string();
        let target = self.target.clone();
        let output = self.run(&[
            "merge",
            "--accept",
            "postpone",
            "--record-only",
            "-c",
            &change,
            source,
            &target,
        ])?;
        if !output.success() {
            tracing::warn!(
                revision = %revision,
                stderr = %output.stderr.join("\n"),
                "record-only merge failed"
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn resolved(&mut self, path: &str) -> Result<bool, MergeError> {
        let output = self.run(&["resolved", path])?;
        Ok(output.success())
    }

    fn commit(&mut self, message: &str) -> Result<CommandOutput, MergeError> {
        let target = self.target.clone();
        self.run(&["commit", "-m", message, &target])
    }

    fn remote_md5(&mut self, url: &str, revision: Revision) -> Result<String, MergeError> {
        let rev = revision.to_string();
        let command = self.command(&["cat", "-r", &rev, url]);
        let mut child = driver::spawn_streaming(&command, self.password())?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;

        let mut hasher = Md5::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = stdout.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(MergeError::Svn {
                command: "cat".to_string(),
                code: status.code().unwrap_or(-1),
                detail: format!("failed to stream {url}@{rev}"),
            });
        }
        Ok(hex::encode(hasher.finalize()))
    }
}
