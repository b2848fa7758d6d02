//! Remote deploy path validation
//!
//! The deploy path is interpolated into remote shell commands, so it is
//! restricted to a literal allow-list of characters before any connection is
//! attempted.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ControlError;

/// Deploy path used when the request does not provide one
pub const DEFAULT_DEPLOY_PATH: &str = "~/media-stack";

static ALLOWED_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-@./A-Za-z0-9_~]+$").expect("deploy path pattern is valid"));

/// A validated remote deploy path, possibly `~`-relative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPath(String);

impl DeployPath {
    /// Validate a user-supplied deploy path; blank input selects the default.
    pub fn parse(input: Option<&str>) -> Result<Self, ControlError> {
        let candidate = match input.map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => DEFAULT_DEPLOY_PATH,
        };

        if !ALLOWED_PATH.is_match(candidate) {
            return Err(ControlError::Validation(
                "Invalid deploy path. Use only letters, numbers, dashes, dots, slashes, underscores, and ~"
                    .to_string(),
            ));
        }

        if candidate.starts_with('-') {
            return Err(ControlError::Validation(
                "Invalid deploy path: must not start with '-'".to_string(),
            ));
        }

        if candidate.split('/').any(|segment| segment == "..") {
            return Err(ControlError::Validation(
                "Invalid deploy path: '..' segments are not allowed".to_string(),
            ));
        }

        let tilde_ok = match candidate.strip_prefix('~') {
            Some(rest) => (rest.is_empty() || rest.starts_with('/')) && !rest.contains('~'),
            None => !candidate.contains('~'),
        };
        if !tilde_ok {
            return Err(ControlError::Validation(
                "Invalid deploy path: '~' is only allowed as a leading home prefix".to_string(),
            ));
        }

        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether resolving this path needs the remote home directory
    pub fn is_home_relative(&self) -> bool {
        self.0.starts_with('~')
    }

    /// Expand a leading `~` using the remote home directory.
    ///
    /// The home directory comes from the remote host and ends up in shell
    /// commands too, so it must be an absolute path within the same
    /// allow-list as the deploy path.
    pub fn resolve(&self, remote_home: &str) -> Result<String, ControlError> {
        if !self.is_home_relative() {
            return Ok(self.0.clone());
        }

        let reported = remote_home.trim();
        if reported.is_empty() {
            return Err(ControlError::Connection(
                "could not determine the remote home directory".to_string(),
            ));
        }
        if !is_usable_home(reported) {
            return Err(ControlError::Connection(format!(
                "remote home directory is not a usable deploy location: {}",
                reported
            )));
        }

        let home = reported.trim_end_matches('/');
        match self.0.strip_prefix("~/") {
            Some(rest) => Ok(format!("{}/{}", home, rest)),
            None if home.is_empty() => Ok("/".to_string()),
            None => Ok(home.to_string()),
        }
    }
}

fn is_usable_home(home: &str) -> bool {
    home.starts_with('/')
        && ALLOWED_PATH.is_match(home)
        && !home.contains('~')
        && !home.split('/').any(|segment| segment == "..")
}

impl std::fmt::Display for DeployPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
