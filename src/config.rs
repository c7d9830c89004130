//! Runtime configuration of a merge run.
//!
//! All input normalization happens here: comma-separated lists are split
//! once at the boundary, the default no-merge patterns are combined with
//! user-supplied extras, and mail recipients always come out as a collection
//! of strings. The structs serialize so a verbose run can dump the effective
//! configuration for reproducibility.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::policy::DEFAULT_NO_MERGE_PATTERNS;

/// Everything the orchestrator needs to know for one run.
#[derive(Serialize, Debug, Clone)]
pub struct MergeConfig {
    /// Source branch in caret notation, e.g. `^/project/branches/stable`.
    pub source: String,
    /// Working-copy root the merges land in.
    pub target: String,
    /// Log instead of committing; the working copy is reverted after each
    /// attempted commit.
    pub noop: bool,
    /// Replay revisions one by one instead of in bulk.
    pub single: bool,
    /// Bundle metadata-only merges into the next content commit.
    pub concise: bool,
    /// Commit a batch even when it contains nothing but metadata merges.
    pub commit_mergeinfo: bool,
    /// Advisory cap on revisions per pass, 0 meaning no cap. Recorded for
    /// troubleshooting; not enforced by the batch loop.
    pub max_revisions: u64,
    /// Literal substrings that mark a revision as record-only.
    pub no_merge_patterns: Vec<String>,
    /// Working-copy-relative paths always reverted after each merge.
    pub ignore_paths: Vec<String>,
    /// Where the record-only set persists between runs.
    pub record_only_file: Option<PathBuf>,
}

impl MergeConfig {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> MergeConfig {
        MergeConfig {
            source: source.into(),
            target: target.into(),
            noop: false,
            single: false,
            concise: false,
            commit_mergeinfo: false,
            max_revisions: 0,
            no_merge_patterns: DEFAULT_NO_MERGE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ignore_paths: Vec::new(),
            record_only_file: None,
        }
    }

    /// Append user-supplied no-merge patterns (CSV) to the defaults.
    pub fn add_patterns_csv(&mut self, csv: &str) {
        self.no_merge_patterns.extend(split_csv(csv));
    }

    /// Append no-merge patterns from a file, one per line; blank lines and
    /// `#` comments are skipped. A missing file contributes nothing.
    pub fn add_patterns_file(&mut self, path: &Path) -> std::io::Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let contents = fs::read_to_string(path)?;
        for line in contents.lines() {
            let pattern = line.trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            self.no_merge_patterns.push(pattern.to_string());
        }
        Ok(())
    }

    pub fn set_ignore_csv(&mut self, csv: &str) {
        self.ignore_paths = split_csv(csv);
    }
}

/// How a raised conflict is delivered.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    Off,
    #[default]
    Log,
    Mail,
}

impl std::fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NotifyChannel::Off => "off",
            NotifyChannel::Log => "log",
            NotifyChannel::Mail => "mail",
        })
    }
}

/// Mail delivery parameters for the conflict notification sink.
#[derive(Serialize, Debug, Clone)]
pub struct MailConfig {
    /// Domain appended to bare usernames, e.g. `@example.com`.
    pub domain: String,
    /// Always-notified recipients, normalized to a collection here.
    pub recipients: Vec<String>,
    pub sender: String,
    /// Command the message is piped to, e.g. `sendmail -t`.
    pub command: Vec<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            domain: String::new(),
            recipients: Vec::new(),
            sender: "idlemerge".to_string(),
            command: vec!["sendmail".to_string(), "-t".to_string()],
        }
    }
}

impl MailConfig {
    pub fn set_recipients_csv(&mut self, csv: &str) {
        self.recipients = split_csv(csv);
    }
}

/// Split a comma-separated value into trimmed, non-empty fields.
pub fn split_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_include_the_builtin_patterns() {
        let config = MergeConfig::new("^/foo/stable", ".");
        assert!(
            config
                .no_merge_patterns
                .iter()
                .any(|p| p == "maven-release-plugin")
        );
        assert_eq!(config.max_revisions, 0);
        assert!(!config.concise);
    }

    #[test]
    fn csv_patterns_extend_the_defaults() {
        let mut config = MergeConfig::new("^/foo/stable", ".");
        let before = config.no_merge_patterns.len();
        config.add_patterns_csv(" WIP , , DO-NOT-MERGE ");
        assert_eq!(config.no_merge_patterns.len(), before + 2);
        assert!(config.no_merge_patterns.contains(&"WIP".to_string()));
    }

    #[test]
    fn patterns_file_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "EXPERIMENT").unwrap();
        drop(file);

        let mut config = MergeConfig::new("^/foo/stable", ".");
        let before = config.no_merge_patterns.len();
        config.add_patterns_file(&path).unwrap();
        assert_eq!(config.no_merge_patterns.len(), before + 1);
        assert!(config.no_merge_patterns.contains(&"EXPERIMENT".to_string()));
    }

    #[test]
    fn missing_patterns_file_is_fine() {
        let mut config = MergeConfig::new("^/foo/stable", ".");
        config
            .add_patterns_file(Path::new("/nonexistent/patterns.txt"))
            .unwrap();
    }

    #[test]
    fn csv_split_normalizes_whitespace_and_empties() {
        assert_eq!(split_csv("a, b ,,c,"), vec!["a", "b", "c"]);
        assert!(split_csv("").is_empty());
    }
}
