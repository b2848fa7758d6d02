//! Command request and result types

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::RunError;

/// A single external command to execute.
///
/// Built once and handed to the runner by value. Unset fields fall back to the
/// runner's defaults (project root, default timeout, program name as label).
#[derive(Debug, Clone)]
pub struct CommandRequest {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env_overrides: HashMap<String, String>,
    timeout: Option<Duration>,
    label: Option<String>,
}

impl CommandRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env_overrides: HashMap::new(),
            timeout: None,
            label: None,
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

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: HashMap<String, String>) -> Self {
        self.env_overrides.extend(vars);
        self
    }

    /// Timeout guard; `Duration::ZERO` disables it
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn get_program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn get_env_overrides(&self) -> &HashMap<String, String> {
        &self.env_overrides
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Optional knobs for [`ProcessRunner::run`](crate::runner::ProcessRunner::run)
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub label: Option<String>,
}

/// Outcome of a command that was spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Classify the outcome into trimmed stdout or a [`RunError`]
    pub fn into_output(self, program: &str, timeout: Duration) -> Result<String, RunError> {
        if self.timed_out {
            return Err(RunError::Timeout {
                program: program.to_string(),
                timeout,
            });
        }

        if self.exit_code == 0 {
            return Ok(self.stdout.trim().to_string());
        }

        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        let output = if !stderr.is_empty() {
            stderr.to_string()
        } else if !stdout.is_empty() {
            stdout.to_string()
        } else {
            format!("exit code {}", self.exit_code)
        };

        Err(RunError::NonZeroExit {
            program: program.to_string(),
            code: self.exit_code,
            output,
        })
    }
}
