//! Remote transport capability used by the orchestrator

use std::path::Path;

use async_trait::async_trait;

use crate::errors::ControlError;
use crate::remote::output::clean_remote_output;
use crate::remote::target::DeployTarget;

/// Result of a remote command or file transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Cleaned stderr, falling back to cleaned stdout
    pub fn detail(&self) -> String {
        let stderr = clean_remote_output(&self.stderr);
        if stderr.is_empty() {
            clean_remote_output(&self.stdout)
        } else {
            stderr
        }
    }
}

/// Opens sessions against remote hosts
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn connect(&self, target: &DeployTarget) -> Result<Box<dyn RemoteSession>, ControlError>;
}

/// An open session against one host.
///
/// A non-zero remote exit is reported through [`ExecOutput`]; `Err` means the
/// command could not be carried out at all (missing local client, timeout).
#[async_trait]
pub trait RemoteSession: Send {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, ControlError>;

    async fn upload(&mut self, local: &Path, remote: &str) -> Result<ExecOutput, ControlError>;

    /// Release everything the session holds
    async fn close(self: Box<Self>) -> Result<(), ControlError>;
}
