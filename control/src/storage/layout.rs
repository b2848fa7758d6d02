//! Project layout on the control host

use std::path::{Path, PathBuf};

use crate::filesys::file::File;

/// Name of the compose file, locally and on the remote host
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// Name of the env file, locally and on the remote host
pub const ENV_FILE_NAME: &str = ".env";

/// Name of the optional settings file in the project root
pub const SETTINGS_FILE_NAME: &str = "control-settings.json";

/// Files of the media stack project the control server manages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root, also the working directory for local docker commands
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn compose_file(&self) -> File {
        File::new(self.root.join(COMPOSE_FILE_NAME))
    }

    pub fn env_file(&self) -> File {
        File::new(self.root.join(ENV_FILE_NAME))
    }

    pub fn settings_file(&self) -> File {
        File::new(self.root.join(SETTINGS_FILE_NAME))
    }
}

impl Default for ProjectLayout {
    fn default() -> Self {
        let root = std::env::var_os("PROJECT_ROOT")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(root)
    }
}
