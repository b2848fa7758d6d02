//! Remote deployment workflow
//!
//! Drives a fixed sequence of steps against one host through a
//! [`RemoteSession`], recording each step in a [`StepLedger`]. The first
//! failing step halts the workflow; the session is closed on every path and
//! the ledger is always returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::TempDir;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::ControlError;
use crate::filesys::file::File;
use crate::remote::ledger::StepLedger;
use crate::remote::output::{
    clean_remote_output, is_command_not_found, is_docker_daemon_unavailable,
    is_docker_permission_error,
};
use crate::remote::target::{ConnectionRequest, DeployRequest, InlineFiles, ValidatedDeploy};
use crate::remote::transport::{ExecOutput, RemoteSession, RemoteTransport};
use crate::storage::layout::{ProjectLayout, COMPOSE_FILE_NAME, ENV_FILE_NAME};

pub const STEP_CONNECT: &str = "Connecting to server...";
pub const STEP_MKDIR: &str = "Creating deploy directory...";
pub const STEP_UPLOAD_COMPOSE: &str = "Uploading docker-compose.yml...";
pub const STEP_UPLOAD_ENV: &str = "Uploading .env...";
pub const STEP_DOCKER: &str = "Checking Docker installation...";
pub const STEP_DOCKER_DAEMON: &str = "Checking Docker daemon access...";
pub const STEP_VERIFY_COMPOSE: &str = "Verifying docker-compose.yml on remote...";
pub const STEP_COMPOSE: &str = "Checking Docker Compose...";
pub const STEP_START: &str = "Starting media stack...";

/// Compose invocation supported by the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeForm {
    /// `docker compose` (Compose v2 plugin)
    Unified,
    /// standalone `docker-compose` (Compose v1)
    Legacy,
}

impl ComposeForm {
    pub fn command(self) -> &'static str {
        match self {
            ComposeForm::Unified => "docker compose",
            ComposeForm::Legacy => "docker-compose",
        }
    }
}

/// Where the deployed stack lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub host: String,
    pub deploy_path: String,
    pub deployed_at: DateTime<Utc>,
}

/// Outcome of a deployment attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: StepLedger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

/// Outcome of a connection test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub success: bool,
    pub ssh: bool,
    /// Docker is installed and its daemon is reachable
    pub docker: bool,
    pub docker_compose: bool,
    pub docker_installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionReport {
    fn unreachable(error: String) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Local files to upload; inline bodies are staged in a temp dir that lives
/// as long as this value
struct StagedFiles {
    compose: File,
    env: Option<File>,
    _staging: Option<TempDir>,
}

/// Remote deployment orchestrator
pub struct Orchestrator {
    transport: Arc<dyn RemoteTransport>,
    layout: ProjectLayout,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn RemoteTransport>, layout: ProjectLayout) -> Self {
        Self { transport, layout }
    }

    /// Run the deployment workflow.
    ///
    /// Only validation failures are returned as `Err`, before any I/O. Every
    /// other failure is reported in the returned [`DeployReport`].
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployReport, ControlError> {
        let validated = request.validate()?;
        let span = info_span!(
            "remote_deploy",
            deploy_id = %Uuid::new_v4(),
            host = %validated.target.host,
            username = %validated.target.username,
        );
        Ok(self.deploy_validated(validated).instrument(span).await)
    }

    async fn deploy_validated(&self, validated: ValidatedDeploy) -> DeployReport {
        info!(deploy_path = %validated.deploy_path, auth = validated.target.auth.name(), "starting remote deployment");

        let mut ledger = StepLedger::new();

        let files = match self.stage_files(&validated.inline).await {
            Ok(files) => files,
            Err(e) => return failure(&mut ledger, e),
        };

        let mut session: Option<Box<dyn RemoteSession>> = None;
        let outcome = self
            .run_deploy_steps(&validated, &files, &mut ledger, &mut session)
            .await;

        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!("failed to close remote session: {}", e);
            }
        }
        drop(files);

        match outcome {
            Ok(deploy_path) => {
                info!(deploy_path = %deploy_path, steps = ledger.len(), "remote deployment succeeded");
                DeployReport {
                    success: true,
                    message: Some("Deployment successful!".to_string()),
                    error: None,
                    steps: ledger,
                    server_info: Some(ServerInfo {
                        host: validated.target.host,
                        deploy_path,
                        deployed_at: Utc::now(),
                    }),
                }
            }
            Err(e) => failure(&mut ledger, e),
        }
    }

    async fn stage_files(&self, inline: &InlineFiles) -> Result<StagedFiles, ControlError> {
        let staging = if inline.compose_yml.is_some() || inline.env_file.is_some() {
            Some(
                tempfile::Builder::new()
                    .prefix("mediastack-deploy-")
                    .tempdir()?,
            )
        } else {
            None
        };

        let compose = match (&staging, &inline.compose_yml) {
            (Some(dir), Some(body)) => stage(dir, COMPOSE_FILE_NAME, body).await?,
            _ => self.layout.compose_file(),
        };

        let env = match (&staging, &inline.env_file) {
            (Some(dir), Some(body)) => Some(stage(dir, ENV_FILE_NAME, body).await?),
            _ => {
                let env = self.layout.env_file();
                if env.exists().await {
                    Some(env)
                } else {
                    None
                }
            }
        };

        Ok(StagedFiles {
            compose,
            env,
            _staging: staging,
        })
    }

    /// Returns the resolved remote deploy path
    async fn run_deploy_steps(
        &self,
        validated: &ValidatedDeploy,
        files: &StagedFiles,
        ledger: &mut StepLedger,
        slot: &mut Option<Box<dyn RemoteSession>>,
    ) -> Result<String, ControlError> {
        ledger.begin(STEP_CONNECT).map_err(ControlError::Internal)?;
        let session = slot.insert(self.transport.connect(&validated.target).await?);
        let home = session.exec("echo $HOME").await?;
        if !home.success() {
            return Err(ControlError::Connection(detail_or_unknown(&home)));
        }
        let deploy_path = validated.deploy_path.resolve(&home.stdout)?;
        ledger.complete().map_err(ControlError::Internal)?;

        ledger.begin(STEP_MKDIR).map_err(ControlError::Internal)?;
        let mkdir = session.exec(&format!("mkdir -p {}", deploy_path)).await?;
        require(&mkdir, "Mkdir failed")?;
        ledger.complete().map_err(ControlError::Internal)?;

        ledger.begin(STEP_UPLOAD_COMPOSE).map_err(ControlError::Internal)?;
        if !files.compose.exists().await {
            return Err(ControlError::RemoteStep(format!(
                "Local compose file not found: {}",
                files.compose.path().display()
            )));
        }
        let upload = session
            .upload(
                files.compose.path(),
                &format!("{}/{}", deploy_path, COMPOSE_FILE_NAME),
            )
            .await?;
        require(&upload, "Upload failed")?;
        ledger.complete().map_err(ControlError::Internal)?;

        if let Some(env) = &files.env {
            ledger.begin(STEP_UPLOAD_ENV).map_err(ControlError::Internal)?;
            let upload = session
                .upload(env.path(), &format!("{}/{}", deploy_path, ENV_FILE_NAME))
                .await?;
            require(&upload, "Env upload failed")?;
            ledger.complete().map_err(ControlError::Internal)?;
        }

        ledger.begin(STEP_DOCKER).map_err(ControlError::Internal)?;
        let docker = session.exec("docker --version").await?;
        if !docker.success() {
            return Err(ControlError::RemoteStep(
                "Docker is not installed on the remote server".to_string(),
            ));
        }
        info!(version = %docker.stdout.trim(), "remote docker detected");
        ledger.complete().map_err(ControlError::Internal)?;

        ledger.begin(STEP_DOCKER_DAEMON).map_err(ControlError::Internal)?;
        if let Some(problem) = docker_daemon_problem(&mut **session).await? {
            return Err(ControlError::RemoteStep(problem));
        }
        ledger.complete().map_err(ControlError::Internal)?;

        ledger.begin(STEP_VERIFY_COMPOSE).map_err(ControlError::Internal)?;
        let verify = session
            .exec(&format!("cd {} && test -f {}", deploy_path, COMPOSE_FILE_NAME))
            .await?;
        if !verify.success() {
            return Err(ControlError::RemoteStep(
                "docker-compose.yml not found on remote server after upload".to_string(),
            ));
        }
        ledger.complete().map_err(ControlError::Internal)?;

        ledger.begin(STEP_COMPOSE).map_err(ControlError::Internal)?;
        let compose = match detect_compose(&mut **session).await? {
            Ok(form) => form,
            Err(detail) if is_command_not_found(&detail) => {
                return Err(ControlError::RemoteStep(
                    "Docker Compose is not installed on the remote server. \
                     Install Compose v2 (recommended) or docker-compose v1, then retry deploy."
                        .to_string(),
                ));
            }
            Err(detail) => {
                return Err(ControlError::RemoteStep(format!(
                    "Docker Compose check failed: {}",
                    non_empty_or_unknown(detail)
                )));
            }
        };
        info!(compose = compose.command(), "remote compose detected");
        ledger.complete().map_err(ControlError::Internal)?;

        ledger.begin(STEP_START).map_err(ControlError::Internal)?;
        let start = session
            .exec(&format!("cd {} && {} up -d", deploy_path, compose.command()))
            .await?;
        if let Some(stderr) = start_failure(&start) {
            return Err(ControlError::RemoteStep(stderr));
        }
        ledger.complete().map_err(ControlError::Internal)?;

        Ok(deploy_path)
    }

    /// Check credentials and remote readiness without deploying
    pub async fn test_connection(
        &self,
        request: ConnectionRequest,
    ) -> Result<ConnectionReport, ControlError> {
        let target = request.into_target()?;
        let span = info_span!("remote_test", host = %target.host, username = %target.username);

        let report = async {
            let mut session = match self.transport.connect(&target).await {
                Ok(session) => session,
                Err(e) => return ConnectionReport::unreachable(format!("SSH connection failed: {}", e)),
            };

            let report = match probe_readiness(&mut *session).await {
                Ok(report) => report,
                Err(e) => ConnectionReport::unreachable(e.to_string()),
            };

            if let Err(e) = session.close().await {
                warn!("failed to close remote session: {}", e);
            }
            report
        }
        .instrument(span)
        .await;

        if report.success {
            info!(host = %target.host, message = ?report.message, "connection test finished");
        } else {
            warn!(host = %target.host, error = ?report.error, "connection test failed");
        }
        Ok(report)
    }
}

async fn probe_readiness(session: &mut dyn RemoteSession) -> Result<ConnectionReport, ControlError> {
    let connect = session.exec("echo mediastack-ok && echo $HOME").await?;
    if !connect.success() {
        return Ok(ConnectionReport::unreachable(format!(
            "SSH connection failed: {}",
            detail_or_unknown(&connect)
        )));
    }

    let docker_installed = session.exec("docker --version").await?.success();

    let mut docker_problem = None;
    if docker_installed {
        docker_problem = docker_daemon_problem(session).await?;
    }
    let docker = docker_installed && docker_problem.is_none();

    let docker_compose = detect_compose(session).await?.is_ok();

    let message = if !docker_installed {
        "Docker not found on server".to_string()
    } else if let Some(problem) = docker_problem {
        problem
    } else if !docker_compose {
        "Docker Compose not found on server".to_string()
    } else {
        "Ready to deploy!".to_string()
    };

    Ok(ConnectionReport {
        success: true,
        ssh: true,
        docker,
        docker_compose,
        docker_installed,
        message: Some(message),
        error: None,
    })
}

async fn stage(dir: &TempDir, name: &str, body: &str) -> Result<File, ControlError> {
    let file = File::new(dir.path().join(name));
    file.write_string(body).await?;
    Ok(file)
}

/// `docker info`; returns an actionable message when the daemon is unusable
async fn docker_daemon_problem(session: &mut dyn RemoteSession) -> Result<Option<String>, ControlError> {
    let info = session.exec("docker info").await?;
    if info.success() {
        return Ok(None);
    }

    let detail = info.detail();
    let problem = if is_docker_permission_error(&detail) {
        "Docker is installed, but your SSH user does not have permission to access the Docker daemon. \
         Fix on the remote host: add the user to the docker group (e.g. `sudo usermod -aG docker $USER` and re-login) \
         or run Docker commands via sudo/root."
            .to_string()
    } else if is_docker_daemon_unavailable(&detail) {
        "Docker is installed, but the Docker daemon is not reachable. \
         Fix on the remote host: ensure the Docker service is running (e.g. `sudo systemctl start docker`)."
            .to_string()
    } else {
        format!("Docker daemon check failed: {}", non_empty_or_unknown(detail))
    };
    Ok(Some(problem))
}

/// Probe the unified form first, then the legacy one. `Err` carries the probe output.
async fn detect_compose(
    session: &mut dyn RemoteSession,
) -> Result<Result<ComposeForm, String>, ControlError> {
    let unified = session.exec("docker compose version").await?;
    if unified.success() {
        return Ok(Ok(ComposeForm::Unified));
    }

    let legacy = session.exec("docker-compose --version").await?;
    if legacy.success() {
        return Ok(Ok(ComposeForm::Legacy));
    }

    let detail = clean_remote_output(&format!("{}\n{}", unified.detail(), legacy.detail()));
    Ok(Err(detail))
}

/// A failed `up -d` only counts when stderr has something other than warnings
pub fn start_failure(output: &ExecOutput) -> Option<String> {
    if output.success() {
        return None;
    }

    let stderr = clean_remote_output(&output.stderr);
    if stderr.is_empty() || stderr.contains("Warning") {
        warn!(
            code = output.code,
            stderr = %stderr,
            "compose exited non-zero without errors, treating as started"
        );
        return None;
    }
    Some(stderr)
}

fn require(output: &ExecOutput, context: &str) -> Result<(), ControlError> {
    if output.success() {
        Ok(())
    } else {
        Err(ControlError::RemoteStep(format!(
            "{}: {}",
            context,
            detail_or_unknown(output)
        )))
    }
}

fn detail_or_unknown(output: &ExecOutput) -> String {
    non_empty_or_unknown(output.detail())
}

fn non_empty_or_unknown(detail: String) -> String {
    if detail.is_empty() {
        "unknown error".to_string()
    } else {
        detail
    }
}

fn failure(ledger: &mut StepLedger, err: ControlError) -> DeployReport {
    if ledger.current().is_some() {
        if let Err(e) = ledger.fail() {
            error!("failed to mark step as errored: {}", e);
        }
    }

    let message = clean_remote_output(&err.to_string());
    let message = if message.is_empty() {
        "Remote deployment failed".to_string()
    } else {
        message
    };
    error!(
        kind = ?err.kind(),
        step = ?ledger.records().last().map(|r| r.step().to_string()),
        error = %message,
        "remote deployment failed"
    );

    DeployReport {
        success: false,
        message: None,
        error: Some(message),
        steps: std::mem::take(ledger),
        server_info: None,
    }
}
