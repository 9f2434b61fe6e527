use crate::sftp_logic::transfer::{Rejection, TransferAction};
use crate::sftp_logic::tree::NodeId;
use crate::sftp_logic::types::{BackendKind, DirectoryEntry, TransferStats};

#[derive(Debug, Clone)]
pub enum SftpEvent {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

/// Progress of one background listing, addressed to a node of one pane.
///
/// `path` is the directory that was listed. Node ids are reused once a subtree
/// is collapsed, so the receiver only applies an event while `node` still
/// resolves to `path`.
#[derive(Debug, Clone)]
pub enum TreeEvent {
    ListingStarted {
        backend: BackendKind,
        node: NodeId,
        path: String,
    },
    ListingBatch {
        backend: BackendKind,
        node: NodeId,
        path: String,
        entries: Vec<DirectoryEntry>,
    },
    ListingFinished {
        backend: BackendKind,
        node: NodeId,
        path: String,
        total: usize,
    },
    ListingFailed {
        backend: BackendKind,
        node: NodeId,
        path: String,
        error: String,
    },
}

impl TreeEvent {
    pub fn backend(&self) -> BackendKind {
        match self {
            TreeEvent::ListingStarted { backend, .. }
            | TreeEvent::ListingBatch { backend, .. }
            | TreeEvent::ListingFinished { backend, .. }
            | TreeEvent::ListingFailed { backend, .. } => *backend,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            TreeEvent::ListingStarted { node, .. }
            | TreeEvent::ListingBatch { node, .. }
            | TreeEvent::ListingFinished { node, .. }
            | TreeEvent::ListingFailed { node, .. } => *node,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TreeEvent::ListingStarted { path, .. }
            | TreeEvent::ListingBatch { path, .. }
            | TreeEvent::ListingFinished { path, .. }
            | TreeEvent::ListingFailed { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransferEvent {
    Completed {
        action: TransferAction,
        destination: String,
        stats: TransferStats,
    },
    Rejected(Rejection),
    Failed {
        source: String,
        error: String,
    },
}
