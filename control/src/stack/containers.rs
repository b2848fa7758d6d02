//! Container status and health snapshot

use serde::Serialize;
use tracing::debug;

use crate::errors::RunError;
use crate::runner::{ProcessRunner, RunOptions};

const PS_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.Status}}|{{.State}}|{{.Ports}}";

/// A container as reported by `docker ps`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub status: String,
    pub state: String,
    pub ports: String,
}

impl Container {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// List all containers, running or not
pub async fn list_containers(runner: &ProcessRunner) -> Result<Vec<Container>, RunError> {
    let output = runner
        .run(
            "docker",
            ["ps", "-a", "--format", PS_FORMAT],
            RunOptions {
                label: Some("docker ps".to_string()),
                ..Default::default()
            },
        )
        .await?;

    let containers = parse_containers(&output);
    debug!("Found {} containers", containers.len());
    Ok(containers)
}

/// Parse `docker ps` lines in [`PS_FORMAT`]; lines without a name are dropped
pub fn parse_containers(output: &str) -> Vec<Container> {
    output
        .lines()
        .map(|line| line.replace('"', ""))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut fields = line.split('|').map(str::trim);
            let id = fields.next().unwrap_or_default().to_string();
            let name = fields.next().unwrap_or_default().to_string();
            if name.is_empty() {
                return None;
            }
            Some(Container {
                id,
                name,
                status: fields.next().unwrap_or_default().to_string(),
                state: fields.next().unwrap_or_default().to_string(),
                ports: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Stopped,
    Unhealthy,
    Restarting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub service: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub action: String,
    pub service: String,
    pub label: String,
}

/// Health derived from container states
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub summary: String,
    pub issues: Vec<ServiceIssue>,
    pub suggestions: Vec<Suggestion>,
    pub container_count: usize,
    pub running_count: usize,
}

/// Classify containers into issues and suggested actions
pub fn health_snapshot(containers: &[Container]) -> HealthSnapshot {
    let mut issues = Vec::new();

    for c in containers.iter().filter(|c| !c.is_running()) {
        issues.push(issue(IssueType::Stopped, &c.name, format!("{} is stopped", c.name)));
    }
    for c in containers.iter().filter(|c| c.status.contains("unhealthy")) {
        issues.push(issue(IssueType::Unhealthy, &c.name, format!("{} is unhealthy", c.name)));
    }
    for c in containers.iter().filter(|c| c.state == "restarting") {
        issues.push(issue(
            IssueType::Restarting,
            &c.name,
            format!("{} is restart-looping", c.name),
        ));
    }

    let suggestions = issues
        .iter()
        .take(3)
        .map(|issue| {
            let (action, verb) = match issue.issue_type {
                IssueType::Stopped => ("start", "Start"),
                IssueType::Restarting => ("logs", "Check"),
                IssueType::Unhealthy => ("restart", "Restart"),
            };
            let label = if issue.issue_type == IssueType::Restarting {
                format!("{} {} logs", verb, issue.service)
            } else {
                format!("{} {}", verb, issue.service)
            };
            Suggestion {
                action: action.to_string(),
                service: issue.service.clone(),
                label,
            }
        })
        .collect();

    let summary = match issues.len() {
        0 => "All services healthy".to_string(),
        1 => format!("1 issue detected: {}", issues[0].message),
        n => format!("{} issues detected", n),
    };

    HealthSnapshot {
        healthy: issues.is_empty(),
        summary,
        issues,
        suggestions,
        container_count: containers.len(),
        running_count: containers.iter().filter(|c| c.is_running()).count(),
    }
}

fn issue(issue_type: IssueType, service: &str, message: String) -> ServiceIssue {
    ServiceIssue {
        issue_type,
        service: service.to_string(),
        message,
    }
}
