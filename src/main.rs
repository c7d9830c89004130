//! Command-line entry point: argument parsing, logging bootstrap, and exit
//! code mapping. All merge behavior lives in the library.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use idlemerge::config::{MailConfig, MergeConfig, NotifyChannel};
use idlemerge::notify;
use idlemerge::orchestrator::Orchestrator;
use idlemerge::svn::{SvnAuth, SvnClient};

/// Automatically merge commits from one Subversion branch to another.
///
/// Designed for promotion ladders (trunk -> stable -> prod): every change
/// landing on the upper branch flows down mechanically, and only genuine
/// conflicts need a human.
#[derive(Parser, Debug)]
#[command(name = "idlemerge", version, about, long_about = None)]
struct Cli {
    /// Source repository URL to merge from, e.g. ^/project/branches/stable.
    #[arg(short = 'S', long)]
    source: String,

    /// Target working copy the merges land in.
    #[arg(short = 't', long, default_value = ".")]
    target: String,

    /// No operation: do not commit merges, revert after each attempted
    /// commit.
    #[arg(short = 'n', long)]
    noop: bool,

    /// Merge revisions one by one; two source revisions become two commits.
    #[arg(short = 's', long)]
    single: bool,

    /// With --single, bundle mergeinfo-only merges together to reduce noise.
    #[arg(short = 'c', long)]
    concise: bool,

    /// Extra comma-separated patterns marking revisions not to be merged.
    #[arg(short = 'a', long)]
    patterns: Option<String>,

    /// File with one extra no-merge pattern per line (# starts a comment).
    #[arg(long, default_value = "patterns.txt")]
    patterns_file: PathBuf,

    /// Maximum number of revisions to merge in this pass, for
    /// troubleshooting. 0 means no cap.
    #[arg(short = 'm', long, default_value_t = 0)]
    max: u64,

    /// File to store/read record-only revisions across runs.
    #[arg(short = 'r', long)]
    record_only_file: Option<PathBuf>,

    /// Verbose mode (debug-level logging, dumps the effective config).
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Commit batches that contain nothing but mergeinfo changes instead of
    /// deferring them.
    #[arg(long)]
    commit_mergeinfo: bool,

    /// Where to deliver conflict notifications.
    #[arg(long, value_enum, default_value_t = NotifyChannel::Log)]
    notify: NotifyChannel,

    /// Comma-separated working-copy-relative paths always reverted after
    /// each merge.
    #[arg(long)]
    ignore: Option<String>,

    /// Username for svn authentication.
    #[arg(long)]
    username: Option<String>,

    /// Password for svn authentication; never echoed to logs.
    #[arg(long)]
    password: Option<String>,

    /// Domain appended to bare usernames when mailing conflict reports.
    #[arg(long, default_value = "")]
    mail_domain: String,

    /// Comma-separated recipients always copied on conflict mail.
    #[arg(long)]
    mail_recipients: Option<String>,

    /// Sender address for conflict mail.
    #[arg(long, default_value = "idlemerge")]
    mail_sender: String,

    /// Command the conflict mail is piped to.
    #[arg(long, default_value = "sendmail -t")]
    mail_command: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<u8, idlemerge::errors::MergeError> {
    let mut config = MergeConfig::new(cli.source, cli.target.clone());
    config.noop = cli.noop;
    config.single = cli.single;
    config.concise = cli.concise;
    config.commit_mergeinfo = cli.commit_mergeinfo;
    config.max_revisions = cli.max;
    config.record_only_file = cli.record_only_file;
    match &cli.patterns {
        Some(csv) => config.add_patterns_csv(csv),
        None => config.add_patterns_file(&cli.patterns_file)?,
    }
    if let Some(csv) = &cli.ignore {
        config.set_ignore_csv(csv);
    }

    let mut mail = MailConfig {
        domain: cli.mail_domain,
        sender: cli.mail_sender,
        ..MailConfig::default()
    };
    if let Some(csv) = &cli.mail_recipients {
        mail.set_recipients_csv(csv);
    }
    let command: Vec<String> = cli
        .mail_command
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if !command.is_empty() {
        mail.command = command;
    }

    if cli.verbose {
        match serde_json::to_string(&config) {
            Ok(dump) => tracing::debug!(config = %dump, "effective configuration"),
            Err(err) => tracing::debug!(%err, "cannot serialize configuration"),
        }
    }

    let auth = cli.username.map(|username| SvnAuth {
        username,
        password: cli.password,
    });
    let client = SvnClient::new(cli.target, auth);
    let mut sink = notify::sink_for(cli.notify, mail);
    let mut orchestrator = Orchestrator::new(config, client);
    let code = orchestrator.launch_merge(sink.as_mut())?;
    Ok(code.clamp(0, 255) as u8)
}
