//! Conflict reporting and notification delivery.
//!
//! A raised conflict produces one [`ConflictReport`]: the human-readable
//! account of what blocked the queue and the exact commands to run in the
//! target working copy to unblock it. The same text goes to the console and
//! to the configured [`ConflictSink`]. Delivery is best-effort: a sink that
//! cannot deliver logs a warning and never masks the conflict exit path.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

use colored::Colorize;

use crate::config::{MailConfig, NotifyChannel};
use crate::errors::{Conflict, MergeError};
use crate::svn::report::status::{ItemState, StatusEntry};

/// Append a domain to a bare username. Inputs that already carry an `@`
/// anywhere (plain addresses, `Name <user@host>` forms) pass through
/// untouched, as does everything when the domain is empty; the operation is
/// idempotent.
pub fn add_email_domain(user: &str, domain: &str) -> String {
    if domain.is_empty() || user.contains('@') {
        return user.to_string();
    }
    format!("{user}@{}", domain.trim_start_matches('@'))
}

/// Recipient set for a conflict: the configured default recipients plus the
/// conflicted revision's author, all normalized through [`add_email_domain`].
pub fn recipients_for_conflict(mail: &MailConfig, conflict: &Conflict) -> BTreeSet<String> {
    let mut recipients: BTreeSet<String> = mail
        .recipients
        .iter()
        .map(|recipient| add_email_domain(recipient, &mail.domain))
        .collect();
    if !conflict.author.is_empty() {
        recipients.insert(add_email_domain(&conflict.author, &mail.domain));
    }
    recipients
}

/// Formatted account of a raised conflict.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub conflict: Conflict,
}

impl ConflictReport {
    pub fn new(conflict: Conflict) -> ConflictReport {
        ConflictReport { conflict }
    }

    pub fn subject(&self) -> String {
        format!(
            "[idlemerge] manual merge needed for r{} on {}",
            self.conflict.revision, self.conflict.target
        )
    }

    /// Report text with the leading phrase highlighted for terminals. Use
    /// [`fmt::Display`] for plain text.
    pub fn banner(&self) -> String {
        let plain = self.to_string();
        match plain.split_once(':') {
            Some((head, rest)) => format!("{}:{}", head.red().bold(), rest),
            None => plain,
        }
    }

    fn listing(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: [(&str, fn(&StatusEntry) -> bool); 4] = [
            ("Conflicted", |e| e.has_conflict()),
            ("Modified", |e| {
                !e.has_conflict() && e.item == ItemState::Modified
            }),
            ("Added", |e| !e.has_conflict() && e.item == ItemState::Added),
            ("Deleted", |e| {
                !e.has_conflict() && e.item == ItemState::Deleted
            }),
        ];
        for (label, filter) in groups {
            let paths: Vec<&str> = self
                .conflict
                .entries
                .iter()
                .filter(|entry| filter(entry))
                .map(|entry| entry.path.as_str())
                .collect();
            if paths.is_empty() {
                continue;
            }
            writeln!(f, "{label}:")?;
            for path in paths {
                writeln!(f, "  {path}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conflict = &self.conflict;
        writeln!(f, "{conflict}")?;
        writeln!(f)?;
        self.listing(f)?;
        writeln!(f)?;
        writeln!(
            f,
            "To resolve manually, run in the target working copy `{}`:",
            conflict.target
        )?;
        writeln!(f, "  svn update --ignore-externals {}", conflict.target)?;
        writeln!(
            f,
            "  svn merge --accept postpone -c {} {} {}",
            conflict.revision, conflict.source, conflict.target
        )?;
        writeln!(f, "  (fix each conflicted file listed above)")?;
        for entry in conflict.entries.iter().filter(|e| e.has_conflict()) {
            writeln!(f, "  svn resolved {}", entry.path)?;
        }
        writeln!(
            f,
            "  svn commit -m 'merge r{} from {}' {}",
            conflict.revision, conflict.source, conflict.target
        )?;
        write!(
            f,
            "The merge queue is blocked until revision {} is resolved.",
            conflict.revision
        )
    }
}

/// Destination for conflict reports.
pub trait ConflictSink {
    fn notify(&mut self, report: &ConflictReport) -> Result<(), MergeError>;
}

/// Swallows reports; the console printout is the only trace.
pub struct NullSink;

impl ConflictSink for NullSink {
    fn notify(&mut self, _report: &ConflictReport) -> Result<(), MergeError> {
        Ok(())
    }
}

/// Emits the report on the error log.
pub struct LogSink;

impl ConflictSink for LogSink {
    fn notify(&mut self, report: &ConflictReport) -> Result<(), MergeError> {
        tracing::error!("{report}");
        Ok(())
    }
}

/// Pipes the report to a mail command (`sendmail -t` by default).
pub struct MailSink {
    pub mail: MailConfig,
}

impl ConflictSink for MailSink {
    fn notify(&mut self, report: &ConflictReport) -> Result<(), MergeError> {
        let recipients = recipients_for_conflict(&self.mail, &report.conflict);
        if recipients.is_empty() {
            tracing::warn!("no conflict recipients configured, skipping mail");
            return Ok(());
        }
        let Some((program, args)) = self.mail.command.split_first() else {
            tracing::warn!("empty mail command, skipping mail");
            return Ok(());
        };
        let to: Vec<String> = recipients.into_iter().collect();
        let message = format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}\n",
            self.mail.sender,
            to.join(", "),
            report.subject(),
            report
        );
        match self.deliver(program, args, &message) {
            Ok(code) if code == 0 => tracing::info!(recipients = %to.join(", "), "conflict mail sent"),
            Ok(code) => tracing::warn!(code, "mail command failed"),
            Err(err) => tracing::warn!(%err, "cannot run mail command"),
        }
        Ok(())
    }
}

impl MailSink {
    fn deliver(&self, program: &str, args: &[String], message: &str) -> std::io::Result<i32> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(message.as_bytes())?;
        }
        let status = child.wait()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Build the sink for the selected channel.
pub fn sink_for(channel: NotifyChannel, mail: MailConfig) -> Box<dyn ConflictSink> {
    match channel {
        NotifyChannel::Off => Box::new(NullSink),
        NotifyChannel::Log => Box::new(LogSink),
        NotifyChannel::Mail => Box::new(MailSink { mail }),
    }
}
