//! Backend-neutral filesystem capability
//!
//! Both the local disk and the SFTP session implement [`Filesystem`], so the
//! recursive mirror in [`super::mirror`] never branches on the backend.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::types::{CommandOutput, EntryKind};
use crate::error::Result;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One child returned by [`Filesystem::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirChild {
    pub name: String,
    pub kind: EntryKind,
}

#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Raw `ls -alh` output for exactly one directory level
    async fn long_listing(&self, path: &str) -> Result<Vec<String>>;

    /// Structured children of `path`, without `.` and `..`
    async fn read_dir(&self, path: &str) -> Result<Vec<DirChild>>;

    /// Kind of the object at `path`, `None` when nothing exists there
    async fn stat(&self, path: &str) -> Result<Option<EntryKind>>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn open_read(&self, path: &str) -> Result<BoxedReader>;

    /// Create or truncate `path` for writing
    async fn open_write(&self, path: &str) -> Result<BoxedWriter>;

    /// Run a shell command on this backend
    async fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Release any session held by this backend
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
