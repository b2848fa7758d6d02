//! Normalization and classification of remote command output

use std::sync::LazyLock;

use regex::Regex;

static KNOWN_HOSTS_NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Warning: Permanently added .* to the list of known hosts\.?$")
        .expect("known hosts pattern is valid")
});

static COMPOSE_UNSET_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^(time=".*"\s+level=warning\s+msg=")?The \\?".*\\?" variable is not set\.? Defaulting to a blank string\.?"?$"#,
    )
    .expect("compose variable pattern is valid")
});

/// Strip ssh/compose noise and blank lines from remote output
pub fn clean_remote_output(value: &str) -> String {
    value
        .replace("\r\n", "\n")
        .split('\n')
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !KNOWN_HOSTS_NOTICE.is_match(line)
                && !COMPOSE_UNSET_VARIABLE.is_match(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn is_docker_permission_error(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower.contains("permission denied")
        && (lower.contains("docker.sock") || lower.contains("connect to the docker daemon"))
}

pub fn is_docker_daemon_unavailable(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running?")
}

pub fn is_command_not_found(value: &str) -> bool {
    value.to_lowercase().contains("not found")
}
