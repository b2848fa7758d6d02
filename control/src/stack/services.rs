//! Docker Compose service actions for the local stack

use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::errors::{ControlError, RunError};
use crate::runner::{ProcessRunner, RunOptions};

/// Pulling images can take much longer than a status query
const UPDATE_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-service compose action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Up,
}

impl ServiceAction {
    fn compose_args(self) -> &'static [&'static str] {
        match self {
            ServiceAction::Start => &["compose", "start"],
            ServiceAction::Stop => &["compose", "stop"],
            ServiceAction::Restart => &["compose", "restart"],
            ServiceAction::Up => &["compose", "up", "-d"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Up => "up",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            ServiceAction::Start => "started",
            ServiceAction::Stop => "stopped",
            ServiceAction::Restart => "restarted",
            ServiceAction::Up => "brought up",
        }
    }
}

impl FromStr for ServiceAction {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ServiceAction::Start),
            "stop" => Ok(ServiceAction::Stop),
            "restart" => Ok(ServiceAction::Restart),
            "up" => Ok(ServiceAction::Up),
            _ => Err(ControlError::Validation("Invalid action".to_string())),
        }
    }
}

/// Validate a compose service name before passing it to docker
pub fn validate_service_name(name: &str) -> Result<&str, ControlError> {
    let name = name.trim();
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(name)
    } else {
        Err(ControlError::Validation(format!(
            "Invalid service name: {}",
            name
        )))
    }
}

/// Run a compose action against one service
pub async fn service_action(
    runner: &ProcessRunner,
    action: ServiceAction,
    service: &str,
) -> Result<(), ControlError> {
    let service = validate_service_name(service)?;
    let mut args: Vec<&str> = action.compose_args().to_vec();
    args.push(service);

    runner
        .run(
            "docker",
            args,
            RunOptions {
                label: Some(format!("compose {} {}", action.as_str(), service)),
                ..Default::default()
            },
        )
        .await?;

    info!(service, action = action.as_str(), "service action completed");
    Ok(())
}

/// Pull new images, recreate changed services and prune dangling images
pub async fn update_stack(runner: &ProcessRunner) -> Result<(), RunError> {
    let steps: [&[&str]; 3] = [
        &["compose", "pull"],
        &["compose", "up", "-d", "--remove-orphans"],
        &["image", "prune", "-f"],
    ];

    for args in steps {
        runner
            .run(
                "docker",
                args.iter().copied(),
                RunOptions {
                    timeout: Some(UPDATE_TIMEOUT),
                    label: Some(format!("docker {}", args.join(" "))),
                    ..Default::default()
                },
            )
            .await?;
    }

    info!("stack updated");
    Ok(())
}

/// Restart every service of the stack
pub async fn restart_stack(runner: &ProcessRunner) -> Result<(), RunError> {
    runner
        .run(
            "docker",
            ["compose", "restart"],
            RunOptions {
                timeout: Some(UPDATE_TIMEOUT),
                label: Some("docker compose restart".to_string()),
                ..Default::default()
            },
        )
        .await?;

    info!("stack restarted");
    Ok(())
}
