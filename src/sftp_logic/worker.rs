//! Background tasks that report back over `mpsc` channels
//!
//! The UI never awaits an engine call on its own loop. It spawns one of these
//! and drains the receiver with `try_recv` between frames.

use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::connection::{Connection, Transport};
use super::parser::parse_listing;
use super::transfer::{transfer, DragPayload, DropTarget, TransferOutcome};
use super::tree::NodeId;
use super::types::{BackendKind, SameBackendMode};
use crate::events::{SftpEvent, TransferEvent, TreeEvent};

/// List `path` and deliver the parsed entries in batches of `batch_size`
pub fn spawn_listing(
    transport: Arc<dyn Transport>,
    backend: BackendKind,
    node: NodeId,
    path: String,
    batch_size: usize,
    sender: Sender<TreeEvent>,
) -> JoinHandle<()> {
    let batch_size = batch_size.max(1);
    tokio::spawn(async move {
        if sender
            .send(TreeEvent::ListingStarted {
                backend,
                node,
                path: path.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        let lines = match transport.list_directory(&path, backend).await {
            Ok(lines) => lines,
            Err(e) => {
                error!("Listing {} ({}) failed: {}", path, backend, e);
                let _ = sender
                    .send(TreeEvent::ListingFailed {
                        backend,
                        node,
                        path,
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let entries = parse_listing(&lines);
        let total = entries.len();
        for batch in entries.chunks(batch_size) {
            let event = TreeEvent::ListingBatch {
                backend,
                node,
                path: path.clone(),
                entries: batch.to_vec(),
            };
            if sender.send(event).await.is_err() {
                return;
            }
        }

        let _ = sender
            .send(TreeEvent::ListingFinished {
                backend,
                node,
                path,
                total,
            })
            .await;
    })
}

/// Run one drop in the background
pub fn spawn_transfer(
    transport: Arc<dyn Transport>,
    source: DragPayload,
    destination: DropTarget,
    mode: SameBackendMode,
    sender: Sender<TransferEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let event = match transfer(transport.as_ref(), &source, &destination, mode).await {
            Ok(TransferOutcome::Completed {
                action,
                destination,
                stats,
            }) => TransferEvent::Completed {
                action,
                destination,
                stats,
            },
            Ok(TransferOutcome::Rejected(rejection)) => TransferEvent::Rejected(rejection),
            Err(e) => {
                error!("Transfer of {} failed: {}", source.path, e);
                TransferEvent::Failed {
                    source: source.path.clone(),
                    error: e.to_string(),
                }
            }
        };
        let _ = sender.send(event).await;
    })
}

/// Open the remote session in the background
pub fn spawn_connect(connection: Arc<Connection>, sender: Sender<SftpEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if sender.send(SftpEvent::Connecting).await.is_err() {
            error!("Failed to send Connecting event");
            return;
        }

        match connection.connect().await {
            Ok(()) => {
                info!("SFTP connection established");
                let _ = sender.send(SftpEvent::Connected).await;
            }
            Err(e) => {
                error!("SFTP connection failed: {}", e);
                let _ = sender
                    .send(SftpEvent::Error(format!("Connection failed: {}", e)))
                    .await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp_logic::local::LocalFs;
    use crate::sftp_logic::tree::DirTree;
    use crate::sftp_logic::types::EntryKind;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_listing_arrives_in_batches() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{}.txt", i)), b"x").unwrap();
        }
        let transport: Arc<dyn Transport> = Arc::new(Connection::local_only());
        let tree = DirTree::new(BackendKind::Local, dir.path().to_str().unwrap());
        let (tx, mut rx) = mpsc::channel(16);

        spawn_listing(
            transport,
            BackendKind::Local,
            tree.root(),
            tree.root_path().to_string(),
            2,
            tx,
        )
        .await
        .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events[0], TreeEvent::ListingStarted { .. }));
        assert!(events.iter().all(|e| e.path() == tree.root_path()));
        let batch_sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                TreeEvent::ListingBatch { entries, .. } => Some(entries.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batch_sizes, vec![2, 2, 1]);
        assert!(matches!(
            events.last(),
            Some(TreeEvent::ListingFinished { total: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_listing_failure_is_reported() {
        let transport: Arc<dyn Transport> = Arc::new(Connection::local_only());
        let tree = DirTree::new(BackendKind::Remote, "/");
        let (tx, mut rx) = mpsc::channel(16);

        spawn_listing(transport, BackendKind::Remote, tree.root(), "/".to_string(), 8, tx)
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(TreeEvent::ListingStarted { .. })));
        match rx.recv().await {
            Some(TreeEvent::ListingFailed { error, .. }) => {
                assert!(error.contains("not connected"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transfer_reports_completion_and_rejection() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        fs::write(local.path().join("a.txt"), b"payload").unwrap();

        let connection = Connection::local_only();
        connection.attach_remote(Box::new(LocalFs::new())).await;
        let transport: Arc<dyn Transport> = Arc::new(connection);

        let source = DragPayload {
            file_name: "a.txt".to_string(),
            backend: BackendKind::Local,
            path: local.path().join("a.txt").to_string_lossy().to_string(),
            is_dir: false,
        };
        let target = DropTarget {
            backend: BackendKind::Remote,
            path: remote.path().to_string_lossy().to_string(),
            kind: EntryKind::Directory,
            child_names: Vec::new(),
        };

        let (tx, mut rx) = mpsc::channel(4);
        spawn_transfer(
            transport.clone(),
            source.clone(),
            target.clone(),
            SameBackendMode::Copy,
            tx.clone(),
        )
        .await
        .unwrap();
        match rx.recv().await {
            Some(TransferEvent::Completed { stats, .. }) => assert_eq!(stats.files_copied, 1),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(fs::read(remote.path().join("a.txt")).unwrap(), b"payload");

        // The target was captured before the upload; the fresh listing still sees a.txt
        spawn_transfer(transport, source, target, SameBackendMode::Copy, tx)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(TransferEvent::Rejected(_))));
    }

    #[tokio::test]
    async fn test_connect_without_host_reports_error() {
        let (tx, mut rx) = mpsc::channel(4);
        spawn_connect(Arc::new(Connection::local_only()), tx)
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(SftpEvent::Connecting)));
        assert!(matches!(rx.recv().await, Some(SftpEvent::Error(_))));
    }
}
