use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::SshHost;
use crate::sftp_logic::types::ConflictPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub local_root: String,
    pub remote_root: String,
    /// Levels listed up front when a pane opens; 1 lists only the root
    pub eager_depth: usize,
    pub listing_batch_size: usize,
    pub connect_timeout_secs: u64,
    /// Unset means remote calls may take as long as they need
    pub operation_timeout_secs: Option<u64>,
    pub conflict_policy: ConflictPolicy,
    pub ssh_file_config: String,
    pub default_host: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Set default ssh config path
        let ssh_config_path = dirs::home_dir()
            .map(|home| home.join(".ssh").join("config").to_string_lossy().to_string())
            .unwrap_or_else(|| "~/.ssh/config".to_string());

        Self {
            local_root: ".".to_string(),
            remote_root: "~".to_string(),
            eager_depth: 2,
            listing_batch_size: 256,
            connect_timeout_secs: 10,
            operation_timeout_secs: None,
            conflict_policy: ConflictPolicy::SkipExisting,
            ssh_file_config: ssh_config_path,
            default_host: None,
        }
    }
}

impl AppConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HostGroup {
    pub name: String,
    pub description: Option<String>,
    pub hosts: Vec<SshHost>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HostsConfig {
    pub groups: Vec<HostGroup>,
}

#[derive(Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
    config_file: PathBuf,
    hosts_file: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("easysftp");
        Self::with_dir(config_dir)
    }

    /// Use `config_dir` instead of the platform config directory
    pub fn with_dir(config_dir: PathBuf) -> Result<Self> {
        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }

        let config_file = config_dir.join("easysftp.toml");
        let hosts_file = config_dir.join("hosts.toml");

        Ok(Self {
            config_dir,
            config_file,
            hosts_file,
        })
    }

    pub fn get_config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        // If config file doesn't exist, create it with default values
        if !self.config_file.exists() {
            let default_config = AppConfig::default();
            self.save_config(&default_config)?;
        }

        let content =
            fs::read_to_string(&self.config_file).context("Failed to read config file")?;

        let mut config: AppConfig =
            toml::from_str(&content).context("Failed to parse config file")?;

        if config.listing_batch_size == 0 {
            config.listing_batch_size = AppConfig::default().listing_batch_size;
        }

        Ok(config)
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_file, toml).context("Failed to write config file")?;
        Ok(())
    }

    pub fn load_hosts(&self) -> Result<Vec<SshHost>> {
        // If hosts file doesn't exist, return empty vector
        if !self.hosts_file.exists() {
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&self.hosts_file).context("Failed to read hosts file")?;

        let config: HostsConfig =
            toml::from_str(&content).context("Failed to parse hosts file")?;

        // Flatten groups into a single vector of hosts
        let mut hosts = Vec::new();
        for group in config.groups {
            for mut host in group.hosts {
                host.group = Some(group.name.clone());
                hosts.push(host);
            }
        }

        Ok(hosts)
    }

    /// Look `alias` up in hosts.toml, then in the SSH config file
    pub fn find_host(&self, alias: &str, ssh_config_path: &Path) -> Result<Option<SshHost>> {
        if let Some(host) = self.load_hosts()?.into_iter().find(|h| h.alias == alias) {
            return Ok(Some(host));
        }

        if !ssh_config_path.exists() {
            tracing::warn!("System SSH config file not found at {:?}", ssh_config_path);
            return Ok(None);
        }

        let content =
            fs::read_to_string(ssh_config_path).context("Failed to read SSH config file")?;
        Ok(parse_ssh_config(&content)
            .into_iter()
            .find(|h| h.alias == alias))
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_file
    }

    pub fn get_hosts_path(&self) -> &Path {
        &self.hosts_file
    }
}

/// Hosts declared in an OpenSSH client config; wildcard patterns are skipped
pub fn parse_ssh_config(content: &str) -> Vec<SshHost> {
    let mut hosts: Vec<SshHost> = Vec::new();
    let mut current: Vec<SshHost> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(2, |c: char| c.is_whitespace() || c == '=');
        let key = parts.next().unwrap_or_default().to_lowercase();
        let value = parts.next().unwrap_or_default().trim().trim_matches('"');
        if value.is_empty() {
            continue;
        }

        if key == "host" {
            hosts.append(&mut current);
            current = value
                .split_whitespace()
                .filter(|alias| !alias.contains(['*', '?', '!']))
                .map(|alias| SshHost::new(alias.to_string(), String::new(), "root".to_string()))
                .collect();
            continue;
        }

        for host in current.iter_mut() {
            match key.as_str() {
                "hostname" => host.host = value.to_string(),
                "user" => host.user = value.to_string(),
                "port" => {
                    if let Ok(port) = value.parse::<u16>() {
                        host.port = Some(port);
                    }
                }
                "identityfile" => host.identity_file = Some(value.to_string()),
                _ => {}
            }
        }
    }
    hosts.append(&mut current);

    tracing::info!("Loaded {} hosts from SSH config", hosts.len());
    hosts
}
