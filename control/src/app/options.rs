//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::remote::ssh::SshOptions;
use crate::runner::RunnerOptions;
use crate::storage::layout::ProjectLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Process runner configuration
    pub runner: RunnerOptions,

    /// SSH client configuration
    pub ssh: SshOptions,

    /// Project files
    pub layout: ProjectLayout,
}

impl AppOptions {
    /// Build options from (already env-overridden) settings
    pub fn from_settings(settings: &Settings, layout: ProjectLayout) -> Self {
        let layout = match &settings.project_root {
            Some(root) => ProjectLayout::new(root),
            None => layout,
        };

        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
                api_token: settings.server.api_token.clone(),
                cors_origins: settings.server.cors_origins.clone(),
            },
            runner: RunnerOptions {
                max_parallel: settings.max_parallel,
                default_timeout: Duration::from_millis(settings.command_timeout_ms),
                working_dir: PathBuf::from(layout.root()),
            },
            ssh: SshOptions {
                command_timeout: Duration::from_secs(settings.remote_command_timeout_secs),
                connect_timeout_secs: settings.ssh_connect_timeout_secs,
            },
            layout,
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum time to wait for in-flight requests on shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(20),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Bearer token required on `/api` routes when set
    pub api_token: Option<SecretString>,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let server = crate::storage::settings::ServerSettings::default();
        Self {
            host: server.host,
            port: server.port,
            api_token: None,
            cors_origins: server.cors_origins,
        }
    }
}
