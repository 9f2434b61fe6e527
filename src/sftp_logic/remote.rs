//! SSH + SFTP backend built on russh

use async_trait::async_trait;
use russh::client;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::connection::{AuthMethod, ConnectionSettings};
use super::filesystem::{BoxedReader, BoxedWriter, DirChild, Filesystem};
use super::parser::is_pseudo_entry;
use super::path_utils::{join_path, sftp_path, shell_quote_path};
use super::types::{BackendKind, CommandOutput, EntryKind};
use crate::error::{EngineError, Result};

/// russh callbacks; host keys are accepted and logged
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            "Accepting host key for {}:{} without known_hosts verification",
            self.host, self.port
        );
        Ok(true)
    }
}

/// One open SSH session with its SFTP subsystem
pub struct RemoteFs {
    handle: client::Handle<ClientHandler>,
    sftp: SftpSession,
    host: String,
}

impl RemoteFs {
    /// Open the SSH session, authenticate and start the SFTP subsystem
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let addr = format!("{}:{}", settings.host, settings.port);
        info!("Connecting to SSH server at {}", addr);

        let ssh_config = client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };
        let handler = ClientHandler {
            host: settings.host.clone(),
            port: settings.port,
        };

        let mut handle = client::connect(Arc::new(ssh_config), addr.as_str(), handler)
            .await
            .map_err(|e| EngineError::Connection(format!("{}: {}", addr, e)))?;
        debug!("SSH handshake completed");

        let auth = match &settings.auth {
            AuthMethod::Password { password } => handle
                .authenticate_password(&settings.username, password)
                .await
                .map_err(|e| EngineError::Connection(format!("Authentication failed: {}", e)))?,
            AuthMethod::Key {
                key_path,
                passphrase,
            } => {
                let key = russh::keys::load_secret_key(key_path, passphrase.as_deref())
                    .map_err(|e| EngineError::Connection(format!("Key error: {}", e)))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
                handle
                    .authenticate_publickey(&settings.username, key_with_hash)
                    .await
                    .map_err(|e| {
                        EngineError::Connection(format!("Authentication failed: {}", e))
                    })?
            }
        };

        if !auth.success() {
            return Err(EngineError::Connection(format!(
                "Authentication rejected by {} for user {}",
                settings.host, settings.username
            )));
        }
        info!("SSH authentication successful");

        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        info!("SFTP subsystem opened on {}", settings.host);

        Ok(Self {
            handle,
            sftp,
            host: settings.host.clone(),
        })
    }

    fn failure(&self, message: impl Into<String>) -> EngineError {
        EngineError::execution(BackendKind::Remote, message)
    }
}

/// A channel error on a live session is a failed command, not a lost connection
fn channel_failure(step: &str, err: russh::Error) -> EngineError {
    EngineError::execution(BackendKind::Remote, format!("{}: {}", step, err))
}

#[async_trait]
impl Filesystem for RemoteFs {
    async fn long_listing(&self, path: &str) -> Result<Vec<String>> {
        let command = format!("LC_ALL=C ls -alh {}", shell_quote_path(path));
        let output = self.execute(&command).await?;
        if !output.success() {
            return Err(self.failure(format!("ls failed: {}", output.stderr.trim())));
        }
        Ok(output.stdout.lines().map(str::to_string).collect())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirChild>> {
        let read_dir = self.sftp.read_dir(sftp_path(path)).await?;
        let mut children = Vec::new();

        for entry in read_dir {
            let name = entry.file_name();
            if is_pseudo_entry(&name) {
                continue;
            }
            let metadata = entry.metadata();
            let is_dir = if metadata.is_symlink() {
                // SFTP stat follows the link
                match self.sftp.metadata(join_path(sftp_path(path), &name)).await {
                    Ok(target) => target.is_dir(),
                    Err(e) => {
                        warn!("Skipping dangling link {}/{}: {}", path, name, e);
                        continue;
                    }
                }
            } else {
                metadata.is_dir()
            };
            let kind = if is_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            children.push(DirChild { name, kind });
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn stat(&self, path: &str) -> Result<Option<EntryKind>> {
        let path = sftp_path(path);
        if !self.sftp.try_exists(path).await? {
            return Ok(None);
        }
        let metadata = self.sftp.metadata(path).await?;
        if metadata.is_dir() {
            Ok(Some(EntryKind::Directory))
        } else {
            Ok(Some(EntryKind::File))
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        debug!("Creating remote directory {}", path);
        self.sftp.create_dir(sftp_path(path)).await?;
        Ok(())
    }

    async fn open_read(&self, path: &str) -> Result<BoxedReader> {
        let file = self.sftp.open(sftp_path(path)).await?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> Result<BoxedWriter> {
        let file = self.sftp.create(sftp_path(path)).await?;
        Ok(Box::new(file))
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("Remote command on {}: {}", self.host, command);
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| channel_failure("opening exec channel", e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| channel_failure("exec", e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                ChannelMsg::Eof | ChannelMsg::Close => {
                    if exit_status.is_some() {
                        break;
                    }
                }
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_status,
        })
    }

    async fn close(&self) -> Result<()> {
        info!("Closing SSH session to {}", self.host);
        if let Err(e) = self.sftp.close().await {
            warn!("SFTP close failed: {}", e);
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}
