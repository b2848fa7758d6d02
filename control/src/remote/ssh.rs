//! OpenSSH client transport
//!
//! Runs the local `ssh`/`scp` binaries (through `sshpass` for password auth)
//! via the shared process runner, so these helper processes count against the
//! same concurrency gate as every other external command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{ControlError, RunError};
use crate::remote::target::{AuthMethod, DeployTarget};
use crate::remote::transport::{ExecOutput, RemoteSession, RemoteTransport};
use crate::runner::{CommandRequest, ProcessRunner};

/// SSH client options
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Runner timeout for each remote command; zero disables it
    pub command_timeout: Duration,

    /// `ConnectTimeout` passed to the ssh client, in seconds
    pub connect_timeout_secs: u32,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::ZERO,
            connect_timeout_secs: 12,
        }
    }
}

impl SshOptions {
    fn common_args(&self) -> Vec<String> {
        [
            "StrictHostKeyChecking=no".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "ConnectionAttempts=1".to_string(),
            "ServerAliveInterval=15".to_string(),
            "ServerAliveCountMax=2".to_string(),
        ]
        .into_iter()
        .flat_map(|option| ["-o".to_string(), option])
        .collect()
    }
}

/// Transport backed by the OpenSSH command line client
pub struct OpenSshTransport {
    runner: Arc<ProcessRunner>,
    options: SshOptions,
}

impl OpenSshTransport {
    pub fn new(runner: Arc<ProcessRunner>, options: SshOptions) -> Self {
        Self { runner, options }
    }
}

#[async_trait]
impl RemoteTransport for OpenSshTransport {
    async fn connect(&self, target: &DeployTarget) -> Result<Box<dyn RemoteSession>, ControlError> {
        let credential = match &target.auth {
            AuthMethod::Password(password) => SessionCredential::Password(password.clone()),
            AuthMethod::PrivateKey(key) => SessionCredential::KeyFile(write_key_file(key).await?),
        };

        debug!(host = %target.host, port = target.port, auth = target.auth.name(), "opened ssh session");

        Ok(Box::new(OpenSshSession {
            runner: self.runner.clone(),
            options: self.options.clone(),
            destination: target.destination(),
            port: target.port,
            credential,
        }))
    }
}

/// Key material is written to a 0600 temp file that lives as long as the session
async fn write_key_file(key: &SecretString) -> Result<NamedTempFile, ControlError> {
    let file = tempfile::Builder::new().prefix("ssh-key-").tempfile()?;

    let key = key.expose_secret();
    let mut contents = key.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    tokio::fs::write(file.path(), contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(file)
}

enum SessionCredential {
    Password(SecretString),
    KeyFile(NamedTempFile),
}

struct OpenSshSession {
    runner: Arc<ProcessRunner>,
    options: SshOptions,
    destination: String,
    port: u16,
    credential: SessionCredential,
}

impl OpenSshSession {
    /// Build the client invocation. `port_flag` is `-p` for ssh and `-P` for scp.
    fn request(&self, client: &str, port_flag: &str, trailing: Vec<String>) -> CommandRequest {
        let mut args = Vec::new();
        let program = match &self.credential {
            SessionCredential::Password(_) => {
                args.extend(["-e".to_string(), client.to_string()]);
                args.extend([port_flag.to_string(), self.port.to_string()]);
                args.extend([
                    "-o".to_string(),
                    "PreferredAuthentications=password".to_string(),
                    "-o".to_string(),
                    "PubkeyAuthentication=no".to_string(),
                ]);
                "sshpass"
            }
            SessionCredential::KeyFile(file) => {
                args.extend(["-i".to_string(), file.path().display().to_string()]);
                args.extend([port_flag.to_string(), self.port.to_string()]);
                client
            }
        };
        args.extend(self.options.common_args());
        args.extend(trailing);

        let mut request = CommandRequest::new(program)
            .args(args)
            .timeout(self.options.command_timeout)
            .label(format!("{} {}", client, self.destination));
        if let SessionCredential::Password(password) = &self.credential {
            request = request.env("SSHPASS", password.expose_secret());
        }
        request
    }

    async fn invoke(&self, client: &str, request: CommandRequest) -> Result<ExecOutput, ControlError> {
        let timeout = request.get_timeout().unwrap_or_default();
        match self.runner.execute(request).await {
            Ok(result) if result.timed_out => Err(ControlError::Timeout {
                program: client.to_string(),
                timeout,
            }),
            Ok(result) => Ok(ExecOutput {
                code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            }),
            Err(RunError::NotFound { program }) => Err(ControlError::CommandNotFound {
                hint: install_hint(&program),
                binary: program,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, ControlError> {
        let request = self.request(
            "ssh",
            "-p",
            vec![self.destination.clone(), command.to_string()],
        );
        self.invoke("ssh", request).await
    }

    async fn upload(&mut self, local: &Path, remote: &str) -> Result<ExecOutput, ControlError> {
        let request = self.request(
            "scp",
            "-P",
            vec![
                local.display().to_string(),
                format!("{}:{}", self.destination, remote),
            ],
        );
        self.invoke("scp", request).await
    }

    async fn close(self: Box<Self>) -> Result<(), ControlError> {
        let session = *self;
        if let SessionCredential::KeyFile(file) = session.credential {
            file.close()?;
        }
        debug!(destination = %session.destination, "closed ssh session");
        Ok(())
    }
}

fn install_hint(binary: &str) -> String {
    match binary {
        "sshpass" => "sshpass is not installed. Install it with: apt-get install sshpass (Ubuntu/Debian) or brew install sshpass (macOS)".to_string(),
        other => format!(
            "{} is not installed in the control server environment. Install OpenSSH client (e.g. apt-get install openssh-client, apk add openssh-client, or brew install openssh).",
            other
        ),
    }
}
