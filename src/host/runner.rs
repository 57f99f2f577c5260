//! External Command Runner
//!
//! Every provisioner reaches the outside world (ceph tools, systemctl, the
//! kernel module loader) through [`CommandRunner`]. The production runner
//! spawns processes with tokio; tests substitute a scripted runner.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Command Types
// =============================================================================

/// A command to run: program, arguments, and an optional time limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
    /// Value masked out of [`CommandSpec::display`]
    pub secret: Option<String>,
}

impl CommandSpec {
    /// Create a command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
            secret: None,
        }
    }

    /// Append a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Limit how long the command may run
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Keep `secret` out of logs and error messages
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// The full command line, for logs and error messages
    pub fn display(&self) -> String {
        let line = if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        };
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => line.replace(secret, "<redacted>"),
            _ => line,
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into [`Error::CommandFailed`]
    pub fn check(self, spec: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::CommandFailed {
                command: spec.display(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

// =============================================================================
// Runner Port
// =============================================================================

/// Port for running external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; callers decide. Failing to spawn
    /// the program or exceeding the command's timeout is.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run a command and require a zero exit status
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.run(spec).await?.check(spec)
    }

    /// Run a command whose failure, including failure to spawn, only gets logged
    async fn run_tolerant(&self, spec: &CommandSpec) -> CommandOutput {
        match self.run(spec).await {
            Ok(output) => output,
            Err(e) => {
                debug!("`{}` could not run: {}", spec.display(), e);
                CommandOutput {
                    status: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                }
            }
        }
    }
}

// =============================================================================
// Process Runner
// =============================================================================

/// Runs commands as child processes of this one
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Running `{}`", spec.display());

        let child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| Error::CommandTimeout {
                    command: spec.display(),
                    timeout: limit,
                })??,
            None => child.wait_with_output().await?,
        };

        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.success() {
            debug!(
                "`{}` exited with {:?}: {}",
                spec.display(),
                output.status,
                output.stderr.trim()
            );
        }

        Ok(output)
    }
}
