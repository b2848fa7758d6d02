//! Error types for the control server

use std::time::Duration;

use thiserror::Error;

/// Failure of a single external command, as classified by the process runner.
///
/// Variants are checked in declaration order: a process that never started is
/// `NotFound`/`Spawn`, a process killed by the timeout guard is `Timeout` even
/// if it later reported an exit code, and only then is a non-zero exit
/// reported as `NonZeroExit`.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("command not found: {program}")]
    NotFound { program: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{output}")]
    NonZeroExit {
        program: String,
        code: i32,
        output: String,
    },
}

impl RunError {
    /// The program this error belongs to
    pub fn program(&self) -> &str {
        match self {
            RunError::NotFound { program }
            | RunError::Spawn { program, .. }
            | RunError::Timeout { program, .. }
            | RunError::NonZeroExit { program, .. } => program,
        }
    }
}

/// Error classification used for branching and HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Connection,
    CommandNotFound,
    Timeout,
    NonZeroExit,
    RemoteStep,
    Internal,
}

/// Main error type for the control server
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("{0}")]
    Validation(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("{hint}")]
    CommandNotFound { binary: String, hint: String },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{message}")]
    NonZeroExit { code: i32, message: String },

    #[error("{0}")]
    RemoteStep(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Validation(_) => ErrorKind::Validation,
            ControlError::Connection(_) => ErrorKind::Connection,
            ControlError::CommandNotFound { .. } => ErrorKind::CommandNotFound,
            ControlError::Timeout { .. } => ErrorKind::Timeout,
            ControlError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            ControlError::RemoteStep(_) => ErrorKind::RemoteStep,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<RunError> for ControlError {
    fn from(err: RunError) -> Self {
        let message = err.friendly_message();
        match err {
            RunError::NotFound { program } => ControlError::CommandNotFound {
                binary: program,
                hint: message,
            },
            RunError::Spawn { .. } => ControlError::Internal(message),
            RunError::Timeout { program, timeout } => ControlError::Timeout { program, timeout },
            RunError::NonZeroExit { code, .. } => ControlError::NonZeroExit { code, message },
        }
    }
}
