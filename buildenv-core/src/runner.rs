//! Command execution seam
//!
//! Package-manager adapters describe commands as [`CommandSpec`] values and
//! hand them to a [`CommandRunner`], so the same adapter can run for real,
//! as a dry run, or against a recording mock in tests.

use crate::error::{Result, SpawnSnafu};
use async_trait::async_trait;
use snafu::ResultExt;
use std::fmt;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Capture stdout instead of inheriting it
    pub capture: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            capture: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Run through sudo. Environment is passed via `env` so sudo keeps it.
    pub fn elevated(self) -> Self {
        let mut args = Vec::with_capacity(self.env.len() + self.args.len() + 2);
        if !self.env.is_empty() {
            args.push("env".to_string());
            args.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
        }
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
            env: Vec::new(),
            capture: self.capture,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutcome {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            stdout: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "signal".to_string(),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;

    /// True when commands are only printed, not executed
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Spawns real processes. stderr is always inherited so progress stays visible.
#[derive(Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        tracing::debug!(command = %spec, "executing");

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());

        let outcome = if spec.capture {
            let output = command
                .stdout(Stdio::piped())
                .output()
                .await
                .context(SpawnSnafu {
                    command: spec.to_string(),
                })?;
            CommandOutcome {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            }
        } else {
            let status = command
                .stdout(Stdio::inherit())
                .status()
                .await
                .context(SpawnSnafu {
                    command: spec.to_string(),
                })?;
            CommandOutcome {
                code: status.code(),
                stdout: String::new(),
            }
        };

        tracing::trace!(command = %spec, code = ?outcome.code, "finished");
        Ok(outcome)
    }
}

/// Records commands without running them; every command succeeds
#[derive(Debug, Default)]
pub struct DryRunRunner {
    commands: Mutex<Vec<CommandSpec>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        tracing::info!(command = %spec, "dry run");
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        Ok(CommandOutcome::success())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
