//! The shared backend connection
//!
//! One `Connection` is created per process and handed to both panes as an
//! `Arc`. It always serves the local filesystem; the remote session is opened
//! by [`Connection::connect`] and kept behind a mutex so only one remote
//! operation runs at a time. Local operations never take that lock.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::filesystem::Filesystem;
use super::local::LocalFs;
use super::mirror::mirror;
use super::path_utils::shell_quote_path;
use super::remote::RemoteFs;
use super::types::{BackendKind, CommandOutput, ConflictPolicy, TransferStats};
use crate::error::{EngineError, Result};

/// How to authenticate the SSH session
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Password { password: String },
    Key {
        key_path: String,
        passphrase: Option<String>,
    },
}

/// Everything needed to open the remote session
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub connect_timeout: Duration,
    /// Upper bound on each remote call; `None` waits indefinitely
    pub operation_timeout: Option<Duration>,
}

/// Operations the tree cache and the transfer orchestrator need
#[async_trait]
pub trait Transport: Send + Sync {
    /// Raw long-format listing of one directory level on `backend`
    async fn list_directory(&self, path: &str, backend: BackendKind) -> Result<Vec<String>>;

    async fn upload(&self, local_path: &str, remote_path: &str) -> Result<TransferStats>;

    async fn download(&self, remote_path: &str, local_path: &str) -> Result<TransferStats>;

    async fn copy_within(&self, backend: BackendKind, from: &str, to: &str) -> Result<()>;

    async fn move_within(&self, backend: BackendKind, from: &str, to: &str) -> Result<()>;
}

pub struct Connection {
    settings: Option<ConnectionSettings>,
    conflict_policy: ConflictPolicy,
    local: LocalFs,
    remote: Mutex<Option<Box<dyn Filesystem>>>,
}

impl Connection {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings: Some(settings),
            conflict_policy: ConflictPolicy::default(),
            local: LocalFs::new(),
            remote: Mutex::new(None),
        }
    }

    /// A connection with no remote host; remote calls fail with `NotConnected`
    pub fn local_only() -> Self {
        Self {
            settings: None,
            conflict_policy: ConflictPolicy::default(),
            local: LocalFs::new(),
            remote: Mutex::new(None),
        }
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    pub fn settings(&self) -> Option<&ConnectionSettings> {
        self.settings.as_ref()
    }

    /// Open the remote session, replacing any session already open.
    ///
    /// On failure the connection stays usable for local operations.
    pub async fn connect(&self) -> Result<()> {
        let settings = self.settings.as_ref().ok_or_else(|| {
            EngineError::Connection("no remote host configured".to_string())
        })?;

        let remote = tokio::time::timeout(settings.connect_timeout, RemoteFs::connect(settings))
            .await
            .map_err(|_| {
                EngineError::Timeout(format!(
                    "connecting to {}:{} took longer than {:?}",
                    settings.host, settings.port, settings.connect_timeout
                ))
            })??;

        self.attach_remote(Box::new(remote)).await;
        Ok(())
    }

    /// Install `remote` as the remote backend, closing the previous one
    pub async fn attach_remote(&self, remote: Box<dyn Filesystem>) {
        let mut slot = self.remote.lock().await;
        if let Some(previous) = slot.replace(remote) {
            if let Err(e) = previous.close().await {
                warn!("Closing previous remote session failed: {}", e);
            }
        }
        info!("Remote backend attached");
    }

    /// Close the remote session if one is open. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        let previous = self.remote.lock().await.take();
        match previous {
            Some(remote) => {
                info!("Disconnecting remote session");
                remote.close().await
            }
            None => Ok(()),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.remote.lock().await.is_some()
    }

    pub fn local(&self) -> &LocalFs {
        &self.local
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.settings.as_ref().and_then(|s| s.operation_timeout);
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| EngineError::Timeout(format!("{} exceeded {:?}", what, limit)))?,
            None => fut.await,
        }
    }

    pub async fn download_with_policy(
        &self,
        remote_path: &str,
        local_path: &str,
        policy: ConflictPolicy,
    ) -> Result<TransferStats> {
        info!("Downloading {} -> {}", remote_path, local_path);
        let guard = self.remote.lock().await;
        let remote = guard.as_deref().ok_or(EngineError::NotConnected)?;
        self.bounded(
            "download",
            mirror(remote, remote_path, &self.local, local_path, policy),
        )
        .await
    }

    pub async fn upload_with_policy(
        &self,
        local_path: &str,
        remote_path: &str,
        policy: ConflictPolicy,
    ) -> Result<TransferStats> {
        info!("Uploading {} -> {}", local_path, remote_path);
        let guard = self.remote.lock().await;
        let remote = guard.as_deref().ok_or(EngineError::NotConnected)?;
        self.bounded(
            "upload",
            mirror(&self.local, local_path, remote, remote_path, policy),
        )
        .await
    }

    /// Shell-level move on the local disk
    pub async fn local_move(&self, from: &str, to: &str) -> Result<()> {
        self.local.move_path(from, to).await
    }

    /// Run `command` on `backend`; a non-zero exit is an `Execution` error
    pub async fn execute_raw(&self, command: &str, backend: BackendKind) -> Result<CommandOutput> {
        let output = match backend {
            BackendKind::Local => self.local.execute(command).await?,
            BackendKind::Remote => {
                let guard = self.remote.lock().await;
                let remote = guard.as_deref().ok_or(EngineError::NotConnected)?;
                self.bounded("remote command", remote.execute(command)).await?
            }
        };

        if !output.success() {
            return Err(EngineError::execution(
                backend,
                format!("`{}` failed: {}", command, output.stderr.trim()),
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl Transport for Connection {
    async fn list_directory(&self, path: &str, backend: BackendKind) -> Result<Vec<String>> {
        debug!("Listing {} ({})", path, backend);
        match backend {
            BackendKind::Local => self.local.long_listing(path).await,
            BackendKind::Remote => {
                let guard = self.remote.lock().await;
                let remote = guard.as_deref().ok_or(EngineError::NotConnected)?;
                self.bounded("remote listing", remote.long_listing(path)).await
            }
        }
    }

    async fn upload(&self, local_path: &str, remote_path: &str) -> Result<TransferStats> {
        self.upload_with_policy(local_path, remote_path, self.conflict_policy)
            .await
    }

    async fn download(&self, remote_path: &str, local_path: &str) -> Result<TransferStats> {
        self.download_with_policy(remote_path, local_path, self.conflict_policy)
            .await
    }

    async fn copy_within(&self, backend: BackendKind, from: &str, to: &str) -> Result<()> {
        match backend {
            BackendKind::Local => self.local.copy_path(from, to).await,
            BackendKind::Remote => {
                let command = format!("cp -r {} {}", shell_quote_path(from), shell_quote_path(to));
                self.execute_raw(&command, backend).await.map(|_| ())
            }
        }
    }

    async fn move_within(&self, backend: BackendKind, from: &str, to: &str) -> Result<()> {
        match backend {
            BackendKind::Local => self.local_move(from, to).await,
            BackendKind::Remote => {
                let command = format!("mv {} {}", shell_quote_path(from), shell_quote_path(to));
                self.execute_raw(&command, backend).await.map(|_| ())
            }
        }
    }
}
