//! Settings file management

use secrecy::SecretString;
use serde::Deserialize;

use crate::logs::LogLevel;

/// Control server settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Root of the media stack project (compose file, .env)
    #[serde(default)]
    pub project_root: Option<String>,

    /// Maximum number of external commands running at once
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Default timeout for local commands, in milliseconds (0 disables)
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Timeout for each remote ssh/scp command, in seconds (0 disables)
    #[serde(default)]
    pub remote_command_timeout_secs: u64,

    /// ssh `ConnectTimeout`, in seconds
    #[serde(default = "default_ssh_connect_timeout")]
    pub ssh_connect_timeout_secs: u32,
}

fn default_max_parallel() -> usize {
    4
}

fn default_command_timeout_ms() -> u64 {
    15_000
}

fn default_ssh_connect_timeout() -> u32 {
    12
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            project_root: None,
            max_parallel: default_max_parallel(),
            command_timeout_ms: default_command_timeout_ms(),
            remote_command_timeout_secs: 0,
            ssh_connect_timeout_secs: default_ssh_connect_timeout(),
        }
    }
}

impl Settings {
    /// Apply environment overrides, looked up through `lookup`.
    ///
    /// Invalid values are skipped and reported in the returned list, since
    /// settings are applied before logging is initialized.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut ignored = Vec::new();

        if let Some(root) = var("PROJECT_ROOT") {
            self.project_root = Some(root);
        }

        if let Some(level) = var("LOG_LEVEL") {
            match level.parse() {
                Ok(level) => self.log_level = level,
                Err(e) => ignored.push(format!("Ignoring LOG_LEVEL: {}", e)),
            }
        }

        if let Some(max) = var("DOCKER_STATUS_MAX_PARALLEL") {
            match max.parse::<usize>() {
                Ok(max) if max > 0 => self.max_parallel = max,
                _ => ignored.push(format!("Ignoring invalid DOCKER_STATUS_MAX_PARALLEL: {}", max)),
            }
        }

        if let Some(host) = var("CONTROL_SERVER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("CONTROL_SERVER_PORT").or_else(|| var("PORT")) {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => ignored.push(format!("Ignoring invalid port: {}", port)),
            }
        }

        if let Some(token) = var("CONTROL_SERVER_TOKEN") {
            self.server.api_token = Some(SecretString::from(token));
        }

        if let Some(origins) = var("CONTROL_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        ignored
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on API requests when set
    #[serde(default)]
    pub api_token: Option<SecretString>,

    /// Browser origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:3002".to_string(),
    ]
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_token: None,
            cors_origins: default_cors_origins(),
        }
    }
}
