//! Remote deployment workflow tests against a scripted transport

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use stackctl::errors::ErrorKind;
use stackctl::remote::orchestrator::{
    STEP_COMPOSE, STEP_CONNECT, STEP_DOCKER, STEP_DOCKER_DAEMON, STEP_MKDIR, STEP_START,
    STEP_UPLOAD_COMPOSE, STEP_UPLOAD_ENV, STEP_VERIFY_COMPOSE,
};
use stackctl::remote::{ConnectionRequest, DeployReport, DeployRequest, Orchestrator, StepStatus};
use stackctl::storage::layout::ProjectLayout;

use crate::support::{deploy_body, deploy_body_with, ScriptedTransport, COMPOSE_BODY};

fn orchestrator(transport: &ScriptedTransport) -> (Orchestrator, TempDir) {
    let project = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        Arc::new(transport.clone()),
        ProjectLayout::new(project.path()),
    );
    (orchestrator, project)
}

fn request(body: serde_json::Value) -> DeployRequest {
    serde_json::from_value(body).unwrap()
}

fn steps(report: &DeployReport) -> Vec<(String, StepStatus)> {
    report
        .steps
        .records()
        .iter()
        .map(|r| (r.step().to_string(), r.status()))
        .collect()
}

fn assert_failed_at(report: &DeployReport, step: &str) {
    assert!(!report.success);
    let records = report.steps.records();
    let (last, done) = records.split_last().unwrap();
    assert_eq!(last.step(), step);
    assert_eq!(last.status(), StepStatus::Error);
    assert!(done.iter().all(|r| r.status() == StepStatus::Done));
}

#[tokio::test]
async fn test_deploy_success() {
    let transport = ScriptedTransport::new();
    let (orchestrator, _project) = orchestrator(&transport);

    let report = assert_ok!(orchestrator.deploy(request(deploy_body())).await);

    assert!(report.success);
    assert_eq!(report.message.as_deref(), Some("Deployment successful!"));
    assert!(report.error.is_none());

    let labels: Vec<_> = steps(&report).into_iter().map(|(step, _)| step).collect();
    assert_eq!(
        labels,
        vec![
            STEP_CONNECT,
            STEP_MKDIR,
            STEP_UPLOAD_COMPOSE,
            STEP_DOCKER,
            STEP_DOCKER_DAEMON,
            STEP_VERIFY_COMPOSE,
            STEP_COMPOSE,
            STEP_START,
        ]
    );
    assert!(report.steps.all_done());

    let server = report.server_info.unwrap();
    assert_eq!(server.host, "media.example.net");
    assert_eq!(server.deploy_path, "/home/deploy/media-stack");

    let commands = transport.commands();
    assert!(commands.contains(&"mkdir -p /home/deploy/media-stack".to_string()));
    assert_eq!(
        commands.last().unwrap(),
        "cd /home/deploy/media-stack && docker compose up -d"
    );
    assert_eq!(
        transport.uploads(),
        vec![(
            "/home/deploy/media-stack/docker-compose.yml".to_string(),
            COMPOSE_BODY.to_string()
        )]
    );
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_deploy_uploads_inline_env() {
    let transport = ScriptedTransport::new();
    let (orchestrator, _project) = orchestrator(&transport);

    let body = deploy_body_with(json!({ "envFile": "PUID=1000\n", "deployPath": "/opt/stack" }));
    let report = orchestrator.deploy(request(body)).await.unwrap();

    assert!(report.success);
    assert!(steps(&report).iter().any(|(step, _)| step == STEP_UPLOAD_ENV));
    assert_eq!(report.server_info.unwrap().deploy_path, "/opt/stack");

    let uploads = transport.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[1], ("/opt/stack/.env".to_string(), "PUID=1000\n".to_string()));
}

#[tokio::test]
async fn test_deploy_uses_project_files() {
    let transport = ScriptedTransport::new();
    let (orchestrator, project) = orchestrator(&transport);
    std::fs::write(project.path().join("docker-compose.yml"), "services: {}\n").unwrap();
    std::fs::write(project.path().join(".env"), "TZ=UTC\n").unwrap();

    let body = deploy_body_with(json!({ "composeYml": null }));
    let report = orchestrator.deploy(request(body)).await.unwrap();

    assert!(report.success);
    let uploaded: Vec<_> = transport.uploads().into_iter().map(|(_, c)| c).collect();
    assert_eq!(uploaded, vec!["services: {}\n", "TZ=UTC\n"]);
}

#[tokio::test]
async fn test_deploy_missing_local_compose() {
    let transport = ScriptedTransport::new();
    let (orchestrator, _project) = orchestrator(&transport);

    let body = deploy_body_with(json!({ "composeYml": null }));
    let report = orchestrator.deploy(request(body)).await.unwrap();

    assert_failed_at(&report, STEP_UPLOAD_COMPOSE);
    assert!(report.error.unwrap().contains("Local compose file not found"));
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_deploy_mkdir_failure() {
    let transport = ScriptedTransport::new();
    transport.respond("mkdir -p /home/deploy/media-stack", 1, "", "mkdir: permission denied");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_MKDIR);
    assert_eq!(report.error.as_deref(), Some("Mkdir failed: mkdir: permission denied"));
    assert!(transport.uploads().is_empty());
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_deploy_upload_failure() {
    let transport = ScriptedTransport::new();
    transport.fail_upload(
        "/home/deploy/media-stack/docker-compose.yml",
        1,
        "scp: /home/deploy/media-stack/docker-compose.yml: No space left on device",
    );
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_UPLOAD_COMPOSE);
    assert_eq!(
        report.error.as_deref(),
        Some("Upload failed: scp: /home/deploy/media-stack/docker-compose.yml: No space left on device")
    );
    assert!(!transport.commands().iter().any(|c| c.starts_with("docker")));
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_deploy_compose_missing_after_upload() {
    let transport = ScriptedTransport::new();
    transport.respond("cd /home/deploy/media-stack && test -f docker-compose.yml", 1, "", "");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_VERIFY_COMPOSE);
    assert_eq!(
        report.error.as_deref(),
        Some("docker-compose.yml not found on remote server after upload")
    );
    assert!(!transport.commands().iter().any(|c| c.contains("up -d")));
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_deploy_empty_remote_home() {
    let transport = ScriptedTransport::new();
    transport.respond("echo $HOME", 0, "\n", "");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_CONNECT);
    assert_eq!(
        report.error.as_deref(),
        Some("Connection failed: could not determine the remote home directory")
    );
    assert_eq!(transport.commands(), vec!["echo $HOME"]);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_deploy_rejects_unsafe_remote_home() {
    let transport = ScriptedTransport::new();
    transport.respond("echo $HOME", 0, "/home/my user\n", "");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_CONNECT);
    assert_eq!(
        report.error.as_deref(),
        Some("Connection failed: remote home directory is not a usable deploy location: /home/my user")
    );
    assert!(!transport.commands().iter().any(|c| c.starts_with("mkdir")));
    assert!(transport.uploads().is_empty());
    assert_eq!(transport.closes(), 1);

    // An absolute deploy path does not depend on the home directory
    let report = orchestrator
        .deploy(request(deploy_body_with(json!({ "deployPath": "/opt/media-stack" }))))
        .await
        .unwrap();
    assert!(report.success);
    assert!(transport.commands().contains(&"mkdir -p /opt/media-stack".to_string()));
}

#[tokio::test]
async fn test_deploy_docker_missing() {
    let transport = ScriptedTransport::new();
    transport.respond("docker --version", 127, "", "bash: docker: command not found");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_DOCKER);
    assert_eq!(
        report.error.as_deref(),
        Some("Docker is not installed on the remote server")
    );
    assert!(report.server_info.is_none());
    assert!(!transport.commands().iter().any(|c| c.contains("up -d")));
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_deploy_docker_permission_denied() {
    let transport = ScriptedTransport::new();
    transport.respond(
        "docker info",
        1,
        "",
        "permission denied while trying to connect to the Docker daemon socket at unix:///var/run/docker.sock",
    );
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_DOCKER_DAEMON);
    assert!(report.error.unwrap().contains("usermod -aG docker"));
}

#[tokio::test]
async fn test_deploy_falls_back_to_legacy_compose() {
    let transport = ScriptedTransport::new();
    transport.respond("docker compose version", 125, "", "docker: 'compose' is not a docker command.");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert!(report.success);
    assert_eq!(
        transport.commands().last().unwrap(),
        "cd /home/deploy/media-stack && docker-compose up -d"
    );
}

#[tokio::test]
async fn test_deploy_compose_missing() {
    let transport = ScriptedTransport::new();
    transport
        .respond("docker compose version", 125, "", "docker: 'compose' is not a docker command.")
        .respond("docker-compose --version", 127, "", "bash: docker-compose: command not found");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_COMPOSE);
    assert!(report.error.unwrap().starts_with("Docker Compose is not installed"));
}

#[tokio::test]
async fn test_deploy_start_tolerates_warnings() {
    let transport = ScriptedTransport::new();
    transport.respond(
        "cd /home/deploy/media-stack && docker compose up -d",
        1,
        "",
        "time=\"2024-05-01T10:00:00Z\" level=warning msg=\"The \\\"PUID\\\" variable is not set. Defaulting to a blank string.\"\nWarning: found orphan containers",
    );
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();
    assert!(report.success);
    assert!(report.steps.all_done());
}

#[tokio::test]
async fn test_deploy_start_failure() {
    let transport = ScriptedTransport::new();
    transport.respond(
        "cd /home/deploy/media-stack && docker compose up -d",
        1,
        "",
        "Error response from daemon: port is already allocated",
    );
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_START);
    assert_eq!(
        report.error.as_deref(),
        Some("Error response from daemon: port is already allocated")
    );
}

#[tokio::test]
async fn test_deploy_connection_refused() {
    let transport = ScriptedTransport::new();
    transport.refuse("Permission denied (publickey,password).");
    let (orchestrator, _project) = orchestrator(&transport);

    let report = orchestrator.deploy(request(deploy_body())).await.unwrap();

    assert_failed_at(&report, STEP_CONNECT);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(
        report.error.as_deref(),
        Some("Connection failed: Permission denied (publickey,password).")
    );
    // No session was opened, so nothing to close
    assert_eq!(transport.closes(), 0);
}

#[tokio::test]
async fn test_validation_happens_before_connecting() {
    let transport = ScriptedTransport::new();
    let (orchestrator, _project) = orchestrator(&transport);

    let invalid = [
        deploy_body_with(json!({ "deployPath": "~/../../etc" })),
        deploy_body_with(json!({ "deployPath": "/srv/stack; rm -rf /" })),
        deploy_body_with(json!({ "host": null })),
        deploy_body_with(json!({ "password": null })),
        deploy_body_with(json!({ "port": 70000 })),
        deploy_body_with(json!({ "authType": "kerberos" })),
    ];

    for body in invalid {
        let err = assert_err!(orchestrator.deploy(request(body.clone())).await);
        assert_eq!(err.kind(), ErrorKind::Validation, "body: {}", body);
    }
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_connection_ready() {
    let transport = ScriptedTransport::new();
    let (orchestrator, _project) = orchestrator(&transport);

    let request: ConnectionRequest = serde_json::from_value(deploy_body()).unwrap();
    let report = orchestrator.test_connection(request).await.unwrap();

    assert!(report.success && report.ssh && report.docker && report.docker_compose);
    assert_eq!(report.message.as_deref(), Some("Ready to deploy!"));
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_connection_without_docker_access() {
    let transport = ScriptedTransport::new();
    transport.respond(
        "docker info",
        1,
        "",
        "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
    );
    let (orchestrator, _project) = orchestrator(&transport);

    let request: ConnectionRequest = serde_json::from_value(deploy_body()).unwrap();
    let report = orchestrator.test_connection(request).await.unwrap();

    assert!(report.success);
    assert!(report.docker_installed);
    assert!(!report.docker);
    assert!(report.message.unwrap().contains("systemctl start docker"));
}

#[tokio::test]
async fn test_connection_unreachable() {
    let transport = ScriptedTransport::new();
    transport.refuse("ssh: connect to host media.example.net port 2222: Connection refused");
    let (orchestrator, _project) = orchestrator(&transport);

    let request: ConnectionRequest = serde_json::from_value(deploy_body()).unwrap();
    let report = orchestrator.test_connection(request).await.unwrap();

    assert!(!report.success);
    assert!(!report.ssh);
    assert!(report.error.unwrap().starts_with("SSH connection failed"));
}
