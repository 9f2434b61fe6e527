//! Drag-and-drop transfer orchestration
//!
//! A drop carries a [`DragPayload`] from one pane onto a [`DropTarget`] in the
//! same or the other pane. [`plan`] decides what should happen without touching
//! either backend; [`transfer`] runs the plan against a [`Transport`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::connection::Transport;
use super::parser::parse_listing;
use super::path_utils::join_path;
use super::types::{BackendKind, EntryKind, SameBackendMode, TransferStats};
use crate::error::{EngineError, Result};

const PAYLOAD_VERSION: u32 = 1;

/// The entry being dragged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragPayload {
    pub file_name: String,
    pub backend: BackendKind,
    /// Absolute path on `backend`
    pub path: String,
    pub is_dir: bool,
}

#[derive(Serialize, Deserialize)]
struct VersionedPayload {
    version: u32,
    #[serde(flatten)]
    payload: DragPayload,
}

impl DragPayload {
    /// JSON form for handing a drag to another process
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(&VersionedPayload {
            version: PAYLOAD_VERSION,
            payload: self.clone(),
        })
        .map_err(|e| EngineError::Parse(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self> {
        let versioned: VersionedPayload =
            serde_json::from_str(text).map_err(|e| EngineError::Parse(e.to_string()))?;
        if versioned.version != PAYLOAD_VERSION {
            return Err(EngineError::Parse(format!(
                "unsupported drag payload version {}",
                versioned.version
            )));
        }
        Ok(versioned.payload)
    }
}

/// The node an entry is dropped onto, captured from its tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub backend: BackendKind,
    pub path: String,
    pub kind: EntryKind,
    /// Names already cached under the target
    pub child_names: Vec<String>,
}

impl DropTarget {
    /// Add the names a fresh listing of the target reports
    pub fn merge_listing<S: AsRef<str>>(&mut self, lines: &[S]) {
        for entry in parse_listing(lines) {
            if !self.child_names.contains(&entry.name) {
                self.child_names.push(entry.name);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferAction {
    Upload,
    Download,
    LocalCopy,
    LocalMove,
    RemoteCopy,
    RemoteMove,
}

impl TransferAction {
    pub fn label(&self) -> &'static str {
        match self {
            TransferAction::Upload => "Uploaded",
            TransferAction::Download => "Downloaded",
            TransferAction::LocalCopy | TransferAction::RemoteCopy => "Copied",
            TransferAction::LocalMove | TransferAction::RemoteMove => "Moved",
        }
    }

    pub fn is_move(&self) -> bool {
        matches!(self, TransferAction::LocalMove | TransferAction::RemoteMove)
    }
}

/// Why a drop was refused before any backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NameCollision { name: String, directory: String },
    NotADirectory { path: String },
}

impl From<Rejection> for EngineError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::NameCollision { name, directory } => {
                EngineError::Collision { name, directory }
            }
            Rejection::NotADirectory { path } => EngineError::NotADirectory(path),
        }
    }
}

/// What [`plan`] decided for a drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub action: TransferAction,
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed {
        action: TransferAction,
        destination: String,
        /// Zero for shell-level copies and moves
        stats: TransferStats,
    },
    Rejected(Rejection),
}

impl TransferOutcome {
    pub fn into_result(self) -> Result<(TransferAction, TransferStats)> {
        match self {
            TransferOutcome::Completed { action, stats, .. } => Ok((action, stats)),
            TransferOutcome::Rejected(rejection) => Err(rejection.into()),
        }
    }
}

/// Validate a drop and pick the action, checking the name collision first
pub fn plan(
    source: &DragPayload,
    destination: &DropTarget,
    mode: SameBackendMode,
) -> std::result::Result<TransferPlan, Rejection> {
    if destination.child_names.iter().any(|n| n == &source.file_name) {
        return Err(Rejection::NameCollision {
            name: source.file_name.clone(),
            directory: destination.path.clone(),
        });
    }
    if destination.kind != EntryKind::Directory {
        return Err(Rejection::NotADirectory {
            path: destination.path.clone(),
        });
    }

    let action = match (source.backend, destination.backend, mode) {
        (BackendKind::Local, BackendKind::Remote, _) => TransferAction::Upload,
        (BackendKind::Remote, BackendKind::Local, _) => TransferAction::Download,
        (BackendKind::Local, BackendKind::Local, SameBackendMode::Copy) => TransferAction::LocalCopy,
        (BackendKind::Local, BackendKind::Local, SameBackendMode::Move) => TransferAction::LocalMove,
        (BackendKind::Remote, BackendKind::Remote, SameBackendMode::Copy) => {
            TransferAction::RemoteCopy
        }
        (BackendKind::Remote, BackendKind::Remote, SameBackendMode::Move) => {
            TransferAction::RemoteMove
        }
    };

    Ok(TransferPlan {
        action,
        source: source.path.clone(),
        destination: join_path(&destination.path, &source.file_name),
    })
}

/// Carry out a drop.
///
/// A directory target is listed again first, so the collision check also sees
/// entries the tree never loaded. Rejections come back as
/// [`TransferOutcome::Rejected`] without any write to either backend; backend
/// failures are errors.
pub async fn transfer(
    transport: &dyn Transport,
    source: &DragPayload,
    destination: &DropTarget,
    mode: SameBackendMode,
) -> Result<TransferOutcome> {
    let mut destination = destination.clone();
    if destination.kind == EntryKind::Directory {
        let lines = transport
            .list_directory(&destination.path, destination.backend)
            .await?;
        destination.merge_listing(&lines);
    }

    let plan = match plan(source, &destination, mode) {
        Ok(plan) => plan,
        Err(rejection) => {
            warn!("Drop of {} rejected: {:?}", source.path, rejection);
            return Ok(TransferOutcome::Rejected(rejection));
        }
    };

    info!("{:?}: {} -> {}", plan.action, plan.source, plan.destination);
    let stats = match plan.action {
        TransferAction::Upload => transport.upload(&plan.source, &plan.destination).await?,
        TransferAction::Download => transport.download(&plan.source, &plan.destination).await?,
        TransferAction::LocalCopy => {
            transport
                .copy_within(BackendKind::Local, &plan.source, &plan.destination)
                .await?;
            TransferStats::default()
        }
        TransferAction::LocalMove => {
            transport
                .move_within(BackendKind::Local, &plan.source, &plan.destination)
                .await?;
            TransferStats::default()
        }
        TransferAction::RemoteCopy => {
            transport
                .copy_within(BackendKind::Remote, &plan.source, &plan.destination)
                .await?;
            TransferStats::default()
        }
        TransferAction::RemoteMove => {
            transport
                .move_within(BackendKind::Remote, &plan.source, &plan.destination)
                .await?;
            TransferStats::default()
        }
    };

    Ok(TransferOutcome::Completed {
        action: plan.action,
        destination: plan.destination,
        stats,
    })
}
