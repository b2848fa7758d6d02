//! Human-readable text for runner failures.
//!
//! Advisory only: callers branch on the [`RunError`] variant, not on this text.

use crate::errors::RunError;

impl RunError {
    pub fn friendly_message(&self) -> String {
        match self {
            RunError::NotFound { program } => missing_cli(program),
            RunError::Spawn { program, source } => {
                format!("Failed to run {}: {}", program, source)
            }
            RunError::Timeout { program, timeout } => {
                if is_docker(program) {
                    format!(
                        "{} timed out. Docker may be hung; verify the daemon is healthy.",
                        program
                    )
                } else {
                    format!("{} timed out after {}s", program, timeout.as_secs_f64())
                }
            }
            RunError::NonZeroExit { program, output, .. } => {
                let lower = output.to_lowercase();
                if lower.contains("cannot connect to the docker daemon") {
                    "Docker daemon is not running. Start Docker Desktop/Engine and retry.".to_string()
                } else if lower.contains("enoent") || lower.contains("command not found") {
                    missing_cli(program)
                } else {
                    output.trim().to_string()
                }
            }
        }
    }
}

fn is_docker(program: &str) -> bool {
    program == "docker" || program == "docker-compose"
}

fn missing_cli(program: &str) -> String {
    if is_docker(program) {
        format!(
            "Required CLI \"{}\" is not available. Install Docker Desktop/Engine or ensure \"{}\" is on PATH.",
            program, program
        )
    } else {
        format!(
            "Required CLI \"{}\" is not available. Install it or ensure \"{}\" is on PATH.",
            program, program
        )
    }
}
