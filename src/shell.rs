//! Shell command execution.
//!
//! Every external command line (git, the package manager) goes through the
//! [`Shell`] trait so the repository manager can be driven by a recording
//! fake in tests. [`SystemShell`] runs the line through `sh -c`, drains both
//! pipes concurrently and enforces a timeout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};
use wait_timeout::ChildExt;

/// Log target of captured command output. The console filters it out
/// unless running verbose.
pub const COMMAND_OUTPUT_TARGET: &str = "pkg_update::command_output";

/// Captured output of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellResult {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn `{command}` in {}: {source}", dir.display())]
    Spawn {
        command: String,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {}: {}", exit_label(*code), stderr.trim())]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
    #[error("failed to collect output of `{command}`: {reason}")]
    Io { command: String, reason: String },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Runs command lines inside a directory.
pub trait Shell {
    /// Runs `command_line` in `dir`, blocking until it completes.
    /// A non-zero exit is an error carrying whatever the command printed.
    fn execute(&self, dir: &Path, command_line: &str) -> Result<ShellResult, ShellError>;
}

/// Executes through the system `sh`.
#[derive(Debug, Clone)]
pub struct SystemShell {
    timeout: Duration,
    envs: Vec<(String, String)>,
}

impl SystemShell {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            envs: Vec::new(),
        }
    }

    /// Adds an environment variable to every spawned command.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Shell for SystemShell {
    fn execute(&self, dir: &Path, command_line: &str) -> Result<ShellResult, ShellError> {
        info!(dir = %dir.display(), "#>>> {command_line}");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command_line)
            .current_dir(dir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout can take down everything `sh` started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| {
            error!(err = %source, "failed to spawn command");
            ShellError::Spawn {
                command: command_line.to_string(),
                dir: dir.to_path_buf(),
                source,
            }
        })?;

        let io_error = |reason: String| ShellError::Io {
            command: command_line.to_string(),
            reason,
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error("stderr was not piped".to_string()))?;
        let stdout_handle = thread::spawn(move || read_stream(stdout));
        let stderr_handle = thread::spawn(move || read_stream(stderr));

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(timeout = ?self.timeout, "command timed out, killing");
                kill_process_group(&mut child);
                let _ = child.wait();
                return Err(ShellError::TimedOut {
                    command: command_line.to_string(),
                    timeout: self.timeout,
                });
            }
            Err(e) => return Err(io_error(e.to_string())),
        };

        let result = ShellResult {
            stdout: join_stream(stdout_handle).map_err(io_error)?,
            stderr: join_stream(stderr_handle).map_err(io_error)?,
        };
        log_output(&result);

        if status.success() {
            Ok(result)
        } else {
            Err(ShellError::NonZeroExit {
                command: command_line.to_string(),
                code: status.code(),
                stdout: result.stdout,
                stderr: result.stderr,
            })
        }
    }
}

/// Kills the child and every process it spawned.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // Safety: `killpg` only sends a signal; the group was created by
    // `process_group(0)` with the child as its leader.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

/// Stdout goes to the log at INFO, stderr at ERROR. Plenty of tools write
/// progress to stderr, so only the exit status decides failure.
fn log_output(result: &ShellResult) {
    let stdout = result.stdout.trim_end();
    if !stdout.is_empty() {
        info!(target: COMMAND_OUTPUT_TARGET, "{stdout}");
    }
    let stderr = result.stderr.trim_end();
    if !stderr.is_empty() {
        error!(target: COMMAND_OUTPUT_TARGET, "{stderr}");
    }
}

fn read_stream(mut stream: impl Read) -> Result<String, String> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).map_err(|e| e.to_string())?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn join_stream(handle: thread::JoinHandle<Result<String, String>>) -> Result<String, String> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err("output reader thread panicked".to_string()),
    }
}

/// Quotes `value` for inclusion in a `sh -c` command line.
#[must_use]
pub fn quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '@' | '+' | '='))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
