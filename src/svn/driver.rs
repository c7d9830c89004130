//! Child-process driver for the `svn` command-line tool.
//!
//! Every invocation pipes stdout and stderr and drains both concurrently, one
//! reader thread per stream, so a child producing megabytes on either pipe can
//! never deadlock against a full pipe buffer. A nonzero exit code is a value
//! in [`CommandOutput`], not an error; only stream I/O failures are errors.
//!
//! Passwords never reach the log: callers place [`PASSWORD_PLACEHOLDER`] in
//! the argument vector and pass the secret separately. Substitution happens
//! immediately before spawn, after the vector has been written to the debug
//! channel.

use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::errors::MergeError;

/// Placeholder substituted with the real password just before spawn.
pub const PASSWORD_PLACEHOLDER: &str = "%%PASSWORD%%";

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; -1 when the child was killed by a signal.
    pub code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// First stderr line, or the empty string. The retryable-error check
    /// keys off the leading `svn: E…` tag of this line.
    pub fn first_stderr(&self) -> &str {
        self.stderr.first().map(String::as_str).unwrap_or("")
    }
}

/// Run a command to completion, capturing stdout/stderr line by line.
///
/// With `discard_output` the streams are still drained (the child must never
/// block on a full pipe) but the lines are dropped instead of collected.
pub fn execute(
    command: &[String],
    discard_output: bool,
    password: Option<&str>,
) -> Result<CommandOutput, MergeError> {
    tracing::debug!(command = %command.join(" "), "executing command");

    let mut child = spawn(command, password)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let (tx, rx) = mpsc::channel::<(bool, io::Result<String>)>();
    let out_tx = tx.clone();
    let out_reader = thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            if out_tx.send((false, line)).is_err() {
                break;
            }
        }
    });
    let err_reader = thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            if tx.send((true, line)).is_err() {
                break;
            }
        }
    });

    let mut stdout_lines = Vec::new();
    let mut stderr_lines = Vec::new();
    let mut stream_error: Option<io::Error> = None;
    for (from_stderr, line) in rx {
        match line {
            Ok(line) => {
                tracing::trace!(stderr = from_stderr, "{line}");
                if !discard_output {
                    if from_stderr {
                        stderr_lines.push(line);
                    } else {
                        stdout_lines.push(line);
                    }
                }
            }
            Err(err) => stream_error = Some(err),
        }
    }
    let _ = out_reader.join();
    let _ = err_reader.join();

    let status = child.wait()?;
    if let Some(err) = stream_error {
        return Err(err.into());
    }
    let code = status.code().unwrap_or(-1);
    tracing::debug!(code, "command finished");
    Ok(CommandOutput {
        code,
        stdout: stdout_lines,
        stderr: stderr_lines,
    })
}

/// Spawn a command and hand back the live child with stdout piped, for
/// consumers that must stream instead of buffering (multi-gigabyte `svn cat`
/// outputs). A detached thread drains stderr so the child cannot stall on it;
/// the caller owns stdout and must `wait()` the child when done.
pub fn spawn_streaming(command: &[String], password: Option<&str>) -> Result<Child, MergeError> {
    tracing::debug!(command = %command.join(" "), "spawning streaming command");

    let mut child = spawn(command, password)?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(line) => tracing::trace!(stderr = true, "{line}"),
                Err(_) => break,
            }
        }
    });
    Ok(child)
}

fn spawn(command: &[String], password: Option<&str>) -> Result<Child, MergeError> {
    let argv: Vec<String> = match password {
        Some(secret) => command
            .iter()
            .map(|arg| {
                if arg == PASSWORD_PLACEHOLDER {
                    secret.to_string()
                } else {
                    arg.clone()
                }
            })
            .collect(),
        None => command.to_vec(),
    };
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| MergeError::Config("empty command vector".to_string()))?;
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_both_streams_and_exit_code() {
        let out = execute(&sh("echo one; echo two >&2; echo three; exit 3"), false, None).unwrap();
        assert_eq!(out.code, 3);
        assert!(!out.success());
        assert_eq!(out.stdout, vec!["one", "three"]);
        assert_eq!(out.stderr, vec!["two"]);
        assert_eq!(out.first_stderr(), "two");
    }

    #[test]
    fn discard_output_still_reports_exit_code() {
        let out = execute(&sh("seq 1 2000; exit 0"), true, None).unwrap();
        assert!(out.success());
        assert!(out.stdout.is_empty());
    }

    /// Output larger than any pipe buffer must not deadlock the reader.
    #[test]
    fn drains_large_interleaved_output() {
        let out = execute(&sh("seq 1 20000; seq 1 20000 >&2"), false, None).unwrap();
        assert_eq!(out.stdout.len(), 20000);
        assert_eq!(out.stderr.len(), 20000);
    }

    #[test]
    fn password_is_substituted_before_spawn() {
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"$0\"".to_string(),
            PASSWORD_PLACEHOLDER.to_string(),
        ];
        let out = execute(&command, false, Some("hunter2")).unwrap();
        assert_eq!(out.stdout, vec!["hunter2"]);
    }

    #[test]
    fn streaming_mode_hands_back_live_stdout() {
        use std::io::Read;

        let mut child = spawn_streaming(&sh("printf 'abc'; echo noise >&2"), None).unwrap();
        let mut buf = String::new();
        child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut buf)
            .unwrap();
        assert_eq!(buf, "abc");
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn empty_command_is_a_config_error() {
        assert!(matches!(
            execute(&[], false, None),
            Err(MergeError::Config(_))
        ));
    }
}
