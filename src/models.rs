use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sftp_logic::connection::{AuthMethod, ConnectionSettings};

pub const PASSWORD_ENV: &str = "EASYSFTP_PASSWORD";

const DEFAULT_KEY_FILES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshHost {
    pub alias: String,
    pub host: String,
    pub user: String,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub identity_file: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
}

impl SshHost {
    pub fn new(alias: String, host: String, user: String) -> Self {
        Self {
            alias,
            host,
            user,
            port: None,
            password: None,
            identity_file: None,
            description: None,
            group: None,
        }
    }

    /// `HostName` when set, otherwise the alias itself
    pub fn address(&self) -> &str {
        if self.host.is_empty() {
            &self.alias
        } else {
            &self.host
        }
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(22)
    }

    /// Pick the authentication method.
    ///
    /// A password from the environment wins, then the configured password,
    /// then the configured identity file, then the first default key that
    /// exists under `~/.ssh`.
    pub fn resolve_auth(&self, env_password: Option<String>, home: Option<&Path>) -> Result<AuthMethod> {
        if let Some(password) = env_password.or_else(|| self.password.clone()) {
            return Ok(AuthMethod::Password { password });
        }

        if let Some(identity) = &self.identity_file {
            let key_path = expand_home(identity, home);
            return Ok(AuthMethod::Key {
                key_path: key_path.to_string_lossy().to_string(),
                passphrase: None,
            });
        }

        if let Some(home) = home {
            let ssh_dir = home.join(".ssh");
            if let Some(key) = DEFAULT_KEY_FILES
                .iter()
                .map(|name| ssh_dir.join(name))
                .find(|path| path.exists())
            {
                return Ok(AuthMethod::Key {
                    key_path: key.to_string_lossy().to_string(),
                    passphrase: None,
                });
            }
        }

        bail!(
            "No credentials for host '{}': set {} or configure an identity file",
            self.alias,
            PASSWORD_ENV
        )
    }

    pub fn connection_settings(
        &self,
        connect_timeout: Duration,
        operation_timeout: Option<Duration>,
    ) -> Result<ConnectionSettings> {
        let env_password = std::env::var(PASSWORD_ENV).ok();
        let home = dirs::home_dir();
        let auth = self.resolve_auth(env_password, home.as_deref())?;

        Ok(ConnectionSettings {
            host: self.address().to_string(),
            port: self.port_or_default(),
            username: self.user.clone(),
            auth,
            connect_timeout,
            operation_timeout,
        })
    }
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host() -> SshHost {
        SshHost::new("web".to_string(), "10.0.0.5".to_string(), "deploy".to_string())
    }

    #[test]
    fn test_env_password_wins() {
        let mut h = host();
        h.password = Some("from-config".to_string());
        h.identity_file = Some("~/.ssh/custom".to_string());

        match h.resolve_auth(Some("from-env".to_string()), None).unwrap() {
            AuthMethod::Password { password } => assert_eq!(password, "from-env"),
            other => panic!("unexpected auth {:?}", other),
        }
    }

    #[test]
    fn test_identity_file_expands_home() {
        let mut h = host();
        h.identity_file = Some("~/.ssh/custom".to_string());
        let home = TempDir::new().unwrap();

        match h.resolve_auth(None, Some(home.path())).unwrap() {
            AuthMethod::Key { key_path, .. } => {
                assert_eq!(PathBuf::from(key_path), home.path().join(".ssh/custom"))
            }
            other => panic!("unexpected auth {:?}", other),
        }
    }

    #[test]
    fn test_default_key_fallback() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir(home.path().join(".ssh")).unwrap();
        std::fs::write(home.path().join(".ssh/id_rsa"), b"key").unwrap();

        match host().resolve_auth(None, Some(home.path())).unwrap() {
            AuthMethod::Key { key_path, .. } => assert!(key_path.ends_with("id_rsa")),
            other => panic!("unexpected auth {:?}", other),
        }

        let empty = TempDir::new().unwrap();
        assert!(host().resolve_auth(None, Some(empty.path())).is_err());
    }

    #[test]
    fn test_address_falls_back_to_alias() {
        let h = SshHost::new("bastion".to_string(), String::new(), "root".to_string());
        assert_eq!(h.address(), "bastion");
        assert_eq!(h.port_or_default(), 22);
    }
}
