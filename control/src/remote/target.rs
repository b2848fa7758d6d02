//! Remote deployment requests and targets

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::errors::ControlError;
use crate::remote::path::DeployPath;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How to authenticate against the remote host
#[derive(Debug)]
pub enum AuthMethod {
    Password(SecretString),
    PrivateKey(SecretString),
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Password(_) => "password",
            AuthMethod::PrivateKey(_) => "key",
        }
    }
}

/// A validated remote host. Never persisted.
#[derive(Debug)]
pub struct DeployTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
}

impl DeployTarget {
    /// `user@host` destination for ssh/scp
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// Port as sent by clients: either a number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortField {
    Number(u64),
    Text(String),
}

/// Credential fields shared by the deploy and test-connection requests
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<PortField>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub private_key: Option<SecretString>,
}

impl ConnectionRequest {
    /// Validate the credential fields into a [`DeployTarget`]
    pub fn into_target(self) -> Result<DeployTarget, ControlError> {
        let host = non_blank(self.host);
        let username = non_blank(self.username);
        let (Some(host), Some(username)) = (host, username) else {
            return Err(ControlError::Validation(
                "Host and username are required".to_string(),
            ));
        };

        if !is_safe_ssh_word(&host) {
            return Err(ControlError::Validation(format!("Invalid host: {}", host)));
        }
        if !is_safe_ssh_word(&username) {
            return Err(ControlError::Validation(format!(
                "Invalid username: {}",
                username
            )));
        }

        let port = parse_port(self.port)?;

        let password = non_blank_secret(self.password);
        let private_key = non_blank_secret(self.private_key);
        let auth_type = match non_blank(self.auth_type) {
            Some(auth_type) => auth_type,
            None if password.is_some() => "password".to_string(),
            None => "key".to_string(),
        };

        let auth = match auth_type.as_str() {
            "key" => match private_key {
                Some(key) => AuthMethod::PrivateKey(key),
                None => {
                    return Err(ControlError::Validation(
                        "Private key is required for SSH key authentication".to_string(),
                    ))
                }
            },
            "password" => match password {
                Some(password) => AuthMethod::Password(password),
                None => {
                    return Err(ControlError::Validation(
                        "Password is required for password authentication".to_string(),
                    ))
                }
            },
            _ => {
                return Err(ControlError::Validation(
                    "Invalid authentication type. Must be \"key\" or \"password\"".to_string(),
                ))
            }
        };

        Ok(DeployTarget {
            host,
            port,
            username,
            auth,
        })
    }
}

/// Body of a deploy request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    #[serde(flatten)]
    pub connection: ConnectionRequest,
    #[serde(default)]
    pub deploy_path: Option<String>,
    /// Generated compose file sent inline instead of using the project file
    #[serde(default)]
    pub compose_yml: Option<String>,
    /// Generated env file sent inline instead of using the project file
    #[serde(default)]
    pub env_file: Option<String>,
}

/// Compose/env contents supplied with the request
#[derive(Debug, Default, Clone)]
pub struct InlineFiles {
    pub compose_yml: Option<String>,
    pub env_file: Option<String>,
}

/// A deploy request that passed validation
#[derive(Debug)]
pub struct ValidatedDeploy {
    pub target: DeployTarget,
    pub deploy_path: DeployPath,
    pub inline: InlineFiles,
}

impl DeployRequest {
    /// Validate the request. No I/O happens here.
    pub fn validate(self) -> Result<ValidatedDeploy, ControlError> {
        let target = self.connection.into_target()?;
        let deploy_path = DeployPath::parse(self.deploy_path.as_deref())?;

        Ok(ValidatedDeploy {
            target,
            deploy_path,
            inline: InlineFiles {
                compose_yml: non_blank_raw(self.compose_yml),
                env_file: non_blank_raw(self.env_file),
            },
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank_secret(value: Option<SecretString>) -> Option<SecretString> {
    value.filter(|v| !v.expose_secret().trim().is_empty())
}

/// Like [`non_blank`] but keeps the original content
fn non_blank_raw(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Host and user names end up as ssh arguments; keep them from looking like options.
fn is_safe_ssh_word(value: &str) -> bool {
    !value.starts_with('-')
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '@')
}

fn parse_port(port: Option<PortField>) -> Result<u16, ControlError> {
    let invalid = || ControlError::Validation("Invalid port".to_string());
    let value = match port {
        None => return Ok(DEFAULT_SSH_PORT),
        Some(PortField::Number(n)) => n,
        Some(PortField::Text(text)) if text.trim().is_empty() => return Ok(DEFAULT_SSH_PORT),
        Some(PortField::Text(text)) => text.trim().parse::<u64>().map_err(|_| invalid())?,
    };
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(invalid()),
    }
}
