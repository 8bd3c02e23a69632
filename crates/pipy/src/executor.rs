// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Command execution on the host.
//!
//! Everything pipy does to the operating system goes through an [`Executor`],
//! which keeps the session and lock logic independent of real processes.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;

#[cfg(test)]
#[path = "./executor_test.rs"]
mod executor_test;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote `word` for a POSIX shell when it contains anything but safe characters.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, `-1` when terminated by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// How command failures are treated by [`Executor::collect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Nonzero exit or any stderr output is an error.
    Strict,
    /// Failures are logged and suppressed.
    BestEffort,
}

/// Runs commands on behalf of pipy.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a command to completion and capture its output.
    async fn output(&self, command: &CommandLine) -> crate::Result<CommandOutput>;

    /// Run a command attached to the current terminal, returning its exit status.
    async fn interactive(&self, command: &CommandLine) -> crate::Result<i32>;

    /// Whether `program` can be found on the host.
    fn is_available(&self, program: &str) -> bool;

    /// Run a command and return its trimmed stdout.
    ///
    /// Under [`Strictness::Strict`] a nonzero exit or any stderr output fails.
    /// Under [`Strictness::BestEffort`] failures are logged and whatever stdout
    /// was produced is returned.
    async fn collect(
        &self,
        command: &CommandLine,
        strictness: Strictness,
    ) -> crate::Result<String> {
        tracing::debug!(%command, "running");
        let output = match self.output(command).await {
            Ok(output) => output,
            Err(err) if strictness == Strictness::BestEffort => {
                tracing::debug!(%command, "ignoring failure: {err}");
                return Ok(String::new());
            }
            Err(err) => return Err(err),
        };

        let stderr = output.stderr.trim();
        match strictness {
            Strictness::Strict if !output.success() => {
                return Err(crate::Error::CommandFailed {
                    command: command.to_string(),
                    status: output.status,
                    stderr: stderr.to_string(),
                });
            }
            Strictness::Strict if !stderr.is_empty() => {
                return Err(crate::Error::CommandStderr {
                    command: command.to_string(),
                    stderr: stderr.to_string(),
                });
            }
            Strictness::BestEffort if !output.success() || !stderr.is_empty() => {
                tracing::debug!(%command, status = output.status, "ignoring failure: {stderr}");
            }
            _ => {}
        }

        Ok(output.stdout.trim().to_string())
    }
}

/// Executor that spawns real processes with tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(command: &CommandLine) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);
        cmd
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn output(&self, command: &CommandLine) -> crate::Result<CommandOutput> {
        let output = Self::command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| crate::Error::SpawnFailed {
                command: command.to_string(),
                error,
            })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn interactive(&self, command: &CommandLine) -> crate::Result<i32> {
        tracing::debug!(%command, "attaching");
        let status = Self::command(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|error| crate::Error::SpawnFailed {
                command: command.to_string(),
                error,
            })?;
        Ok(status.code().unwrap_or(-1))
    }

    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
