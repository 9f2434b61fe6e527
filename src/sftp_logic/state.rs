use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::path_utils::parent_path;
use super::transfer::{transfer, TransferOutcome};
use super::tree::{DirTree, NodeId};
use super::types::{BackendKind, SameBackendMode};
use crate::error::{EngineError, Result};
use crate::events::TreeEvent;

/// The two panes and the connection they share
pub struct DualPane {
    connection: Arc<Connection>,
    local: DirTree,
    remote: DirTree,
    pub active_panel: BackendKind,
    pub status_message: Option<String>,
    pub status_message_time: Option<Instant>,
}

impl DualPane {
    pub fn new(
        connection: Arc<Connection>,
        local_root: impl Into<String>,
        remote_root: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            local: DirTree::new(BackendKind::Local, local_root),
            remote: DirTree::new(BackendKind::Remote, remote_root),
            active_panel: BackendKind::Local,
            status_message: None,
            status_message_time: None,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn tree(&self, backend: BackendKind) -> &DirTree {
        match backend {
            BackendKind::Local => &self.local,
            BackendKind::Remote => &self.remote,
        }
    }

    pub fn tree_mut(&mut self, backend: BackendKind) -> &mut DirTree {
        match backend {
            BackendKind::Local => &mut self.local,
            BackendKind::Remote => &mut self.remote,
        }
    }

    /// Set a status message to be displayed to the user
    pub fn set_status_message(&mut self, message: &str) {
        self.status_message = Some(message.to_string());
        self.status_message_time = Some(Instant::now());
    }

    pub fn clear_status_message(&mut self) {
        self.status_message = None;
        self.status_message_time = None;
    }

    /// Drop the status message once it has been shown for `ttl`
    pub fn expire_status_message(&mut self, ttl: Duration) {
        if self
            .status_message_time
            .is_some_and(|shown| shown.elapsed() >= ttl)
        {
            self.clear_status_message();
        }
    }

    /// Switch the active panel between local and remote
    pub fn switch_panel(&mut self) {
        self.active_panel = self.active_panel.opposite();
    }

    pub async fn connect(&mut self) -> Result<()> {
        match self.connection.connect().await {
            Ok(()) => {
                let host = self
                    .connection
                    .settings()
                    .map(|s| s.host.clone())
                    .unwrap_or_default();
                self.set_status_message(&format!("Connected to {}", host));
                Ok(())
            }
            Err(e) => {
                self.set_status_message(&format!("Connection failed: {}", e));
                Err(e)
            }
        }
    }

    /// Close the session and forget the cached remote tree
    pub async fn disconnect(&mut self) -> Result<()> {
        self.connection.disconnect().await?;
        let root = self.remote.root_path().to_string();
        self.remote = DirTree::new(BackendKind::Remote, root);
        self.set_status_message("Disconnected");
        Ok(())
    }

    pub async fn expand(&mut self, backend: BackendKind, id: NodeId) -> Result<Vec<NodeId>> {
        let connection = Arc::clone(&self.connection);
        self.tree_mut(backend).expand(id, connection.as_ref()).await
    }

    pub async fn populate(&mut self, backend: BackendKind, id: NodeId, depth: usize) -> Result<()> {
        let connection = Arc::clone(&self.connection);
        self.tree_mut(backend)
            .populate(id, depth, connection.as_ref())
            .await
    }

    pub fn resolve_path(&self, backend: BackendKind, id: NodeId) -> Option<String> {
        self.tree(backend).resolve_path(id)
    }

    /// Drop the entry `src_id` of one pane onto the node `dst_id` of a pane.
    ///
    /// After a completed transfer the destination is listed again, and for a
    /// move so is the directory the entry left.
    pub async fn drop_entry(
        &mut self,
        src_backend: BackendKind,
        src_id: NodeId,
        dst_backend: BackendKind,
        dst_id: NodeId,
        mode: SameBackendMode,
    ) -> Result<TransferOutcome> {
        let payload = self.tree(src_backend).drag_payload(src_id).ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("node {:?} is not a draggable entry", src_id),
            ))
        })?;
        let target = self.tree(dst_backend).drop_target(dst_id).ok_or_else(|| {
            EngineError::NotADirectory(format!("node {:?} is not a drop target", dst_id))
        })?;

        let outcome = transfer(self.connection.as_ref(), &payload, &target, mode).await?;

        match &outcome {
            TransferOutcome::Completed {
                action,
                destination,
                ..
            } => {
                self.set_status_message(&format!(
                    "{} {} to {}",
                    action.label(),
                    payload.file_name,
                    destination
                ));
                if action.is_move() {
                    self.refresh_path(src_backend, &parent_path(&payload.path))
                        .await;
                }
                self.refresh_path(dst_backend, &target.path).await;
            }
            TransferOutcome::Rejected(rejection) => {
                let error: EngineError = rejection.clone().into();
                self.set_status_message(&error.to_string());
            }
        }
        Ok(outcome)
    }

    /// Re-list the cached directory at `path`, if it is still in the tree
    async fn refresh_path(&mut self, backend: BackendKind, path: &str) {
        let Some(id) = self.tree(backend).find_absolute(path) else {
            debug!("{} not cached in {} tree; skipping refresh", path, backend);
            return;
        };
        if let Err(e) = self.expand(backend, id).await {
            warn!("Refreshing {} failed: {}", path, e);
            self.set_status_message(&format!("Refresh failed: {}", e));
        }
    }

    /// Fold one background listing event into the matching tree.
    ///
    /// Events whose node no longer resolves to the listed directory are
    /// dropped; the node was collapsed or its slot now holds another entry.
    pub fn apply_tree_event(&mut self, event: TreeEvent) {
        let (backend, node) = (event.backend(), event.node());
        let tree = self.tree(backend);
        let current = tree
            .node(node)
            .filter(|n| n.is_directory())
            .and_then(|_| tree.resolve_path(node));
        if current.as_deref() != Some(event.path()) {
            debug!(
                "Dropping stale listing event for {:?} ({}), node now {:?}",
                node,
                event.path(),
                current
            );
            return;
        }

        match event {
            TreeEvent::ListingStarted { .. } => {
                if let Err(e) = self.tree_mut(backend).begin_expand(node) {
                    warn!("Ignoring listing for {:?}: {}", node, e);
                }
            }
            TreeEvent::ListingBatch { entries, .. } => {
                self.tree_mut(backend).append_entries(node, &entries);
            }
            TreeEvent::ListingFinished { total, .. } => {
                self.tree_mut(backend).finish_expand(node);
                info!("Listed {} entries into {} tree", total, backend);
            }
            TreeEvent::ListingFailed { error, .. } => {
                // begin_expand already dropped the children; show it as unexpanded
                self.tree_mut(backend).collapse(node);
                self.set_status_message(&format!("Listing failed: {}", error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp_logic::local::LocalFs;
    use crate::sftp_logic::parser::parse_listing;
    use crate::sftp_logic::transfer::{Rejection, TransferAction};
    use crate::sftp_logic::tree::ExpansionState;
    use crate::sftp_logic::worker::spawn_listing;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Fixture {
        local: TempDir,
        remote: TempDir,
        pane: DualPane,
    }

    async fn fixture() -> Fixture {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let connection = Connection::local_only();
        connection.attach_remote(Box::new(LocalFs::new())).await;
        let pane = DualPane::new(
            Arc::new(connection),
            local.path().to_string_lossy().to_string(),
            remote.path().to_string_lossy().to_string(),
        );
        Fixture {
            local,
            remote,
            pane,
        }
    }

    #[tokio::test]
    async fn test_upload_by_drop_refreshes_destination() {
        let mut f = fixture().await;
        fs::write(f.local.path().join("report.csv"), b"a,b").unwrap();
        fs::create_dir(f.remote.path().join("inbox")).unwrap();

        let local_root = f.pane.tree(BackendKind::Local).root();
        let remote_root = f.pane.tree(BackendKind::Remote).root();
        f.pane.expand(BackendKind::Local, local_root).await.unwrap();
        f.pane.expand(BackendKind::Remote, remote_root).await.unwrap();

        let src = f.pane.tree(BackendKind::Local).find_path("report.csv").unwrap();
        let dst = f.pane.tree(BackendKind::Remote).find_path("inbox").unwrap();
        let outcome = f
            .pane
            .drop_entry(
                BackendKind::Local,
                src,
                BackendKind::Remote,
                dst,
                SameBackendMode::Copy,
            )
            .await
            .unwrap();

        let (action, stats) = outcome.into_result().unwrap();
        assert_eq!(action, TransferAction::Upload);
        assert_eq!(stats.files_copied, 1);
        assert_eq!(fs::read(f.remote.path().join("inbox/report.csv")).unwrap(), b"a,b");

        let remote = f.pane.tree(BackendKind::Remote);
        let inbox = remote.find_path("inbox").unwrap();
        assert_eq!(remote.node(inbox).unwrap().state, ExpansionState::Expanded);
        assert_eq!(remote.child_names(inbox), vec!["report.csv"]);
    }

    #[tokio::test]
    async fn test_drop_onto_existing_name_is_rejected() {
        let mut f = fixture().await;
        fs::write(f.local.path().join("report.csv"), b"new").unwrap();
        fs::write(f.remote.path().join("report.csv"), b"old").unwrap();

        let local_root = f.pane.tree(BackendKind::Local).root();
        let remote_root = f.pane.tree(BackendKind::Remote).root();
        f.pane.expand(BackendKind::Local, local_root).await.unwrap();
        f.pane.expand(BackendKind::Remote, remote_root).await.unwrap();

        let src = f.pane.tree(BackendKind::Local).find_path("report.csv").unwrap();
        let outcome = f
            .pane
            .drop_entry(
                BackendKind::Local,
                src,
                BackendKind::Remote,
                remote_root,
                SameBackendMode::Copy,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            TransferOutcome::Rejected(Rejection::NameCollision { .. })
        ));
        assert_eq!(fs::read(f.remote.path().join("report.csv")).unwrap(), b"old");
        assert!(f
            .pane
            .status_message
            .as_deref()
            .unwrap()
            .contains("already exists"));
    }

    #[tokio::test]
    async fn test_local_move_refreshes_both_directories() {
        let mut f = fixture().await;
        fs::create_dir(f.local.path().join("from")).unwrap();
        fs::create_dir(f.local.path().join("to")).unwrap();
        fs::write(f.local.path().join("from/x.txt"), b"x").unwrap();

        let root = f.pane.tree(BackendKind::Local).root();
        f.pane.populate(BackendKind::Local, root, 2).await.unwrap();

        let src = f.pane.tree(BackendKind::Local).find_path("from/x.txt").unwrap();
        let dst = f.pane.tree(BackendKind::Local).find_path("to").unwrap();
        f.pane
            .drop_entry(
                BackendKind::Local,
                src,
                BackendKind::Local,
                dst,
                SameBackendMode::Move,
            )
            .await
            .unwrap()
            .into_result()
            .unwrap();

        let tree = f.pane.tree(BackendKind::Local);
        let from = tree.find_path("from").unwrap();
        let to = tree.find_path("to").unwrap();
        assert_eq!(tree.node(from).unwrap().state, ExpansionState::EmptyDirectory);
        assert_eq!(tree.child_names(to), vec!["x.txt"]);
        assert!(!f.local.path().join("from/x.txt").exists());
    }

    #[tokio::test]
    async fn test_background_listing_events_build_the_tree() {
        let mut f = fixture().await;
        fs::create_dir(f.remote.path().join("d")).unwrap();
        fs::write(f.remote.path().join("e.txt"), b"e").unwrap();

        let tree = f.pane.tree(BackendKind::Remote);
        let (root, path) = (tree.root(), tree.root_path().to_string());
        let (tx, mut rx) = mpsc::channel(8);
        spawn_listing(
            f.pane.connection().clone(),
            BackendKind::Remote,
            root,
            path,
            1,
            tx,
        )
        .await
        .unwrap();

        while let Some(event) = rx.recv().await {
            f.pane.apply_tree_event(event);
        }

        let tree = f.pane.tree(BackendKind::Remote);
        assert_eq!(tree.child_names(root), vec!["d", "e.txt"]);
        assert_eq!(tree.node(root).unwrap().state, ExpansionState::Expanded);
    }

    #[tokio::test]
    async fn test_disconnect_resets_remote_tree() {
        let mut f = fixture().await;
        fs::write(f.remote.path().join("e.txt"), b"e").unwrap();
        let root = f.pane.tree(BackendKind::Remote).root();
        f.pane.expand(BackendKind::Remote, root).await.unwrap();

        f.pane.disconnect().await.unwrap();

        let tree = f.pane.tree(BackendKind::Remote);
        assert!(tree.child_names(tree.root()).is_empty());
        assert!(!f.pane.connection().is_connected().await);
        let err = f.pane.expand(BackendKind::Remote, root).await.unwrap_err();
        assert!(matches!(err, EngineError::NotConnected));
    }

    #[tokio::test]
    async fn test_drop_onto_unexpanded_directory_holding_the_name() {
        let mut f = fixture().await;
        fs::create_dir_all(f.local.path().join("d")).unwrap();
        fs::write(f.local.path().join("d/inner.txt"), b"i").unwrap();
        fs::create_dir_all(f.local.path().join("to/d")).unwrap();

        let root = f.pane.tree(BackendKind::Local).root();
        f.pane.expand(BackendKind::Local, root).await.unwrap();
        let tree = f.pane.tree(BackendKind::Local);
        let src = tree.find_path("d").unwrap();
        let dst = tree.find_path("to").unwrap();
        assert_eq!(tree.node(dst).unwrap().state, ExpansionState::Collapsed);

        let outcome = f
            .pane
            .drop_entry(
                BackendKind::Local,
                src,
                BackendKind::Local,
                dst,
                SameBackendMode::Copy,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::Rejected(Rejection::NameCollision {
                name: "d".to_string(),
                directory: f.local.path().join("to").to_string_lossy().to_string(),
            })
        );
        assert!(!f.local.path().join("to/d/d").exists());
        assert!(!f.local.path().join("to/d/inner.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_onto_unexpanded_remote_directory_holding_the_name() {
        let mut f = fixture().await;
        fs::create_dir(f.local.path().join("d")).unwrap();
        fs::write(f.local.path().join("d/inner.txt"), b"i").unwrap();
        fs::create_dir_all(f.remote.path().join("to/d")).unwrap();

        let local_root = f.pane.tree(BackendKind::Local).root();
        let remote_root = f.pane.tree(BackendKind::Remote).root();
        f.pane.expand(BackendKind::Local, local_root).await.unwrap();
        f.pane.expand(BackendKind::Remote, remote_root).await.unwrap();

        let src = f.pane.tree(BackendKind::Local).find_path("d").unwrap();
        let dst = f.pane.tree(BackendKind::Remote).find_path("to").unwrap();
        let outcome = f
            .pane
            .drop_entry(
                BackendKind::Local,
                src,
                BackendKind::Remote,
                dst,
                SameBackendMode::Copy,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            TransferOutcome::Rejected(Rejection::NameCollision { .. })
        ));
        assert!(!f.remote.path().join("to/d/inner.txt").exists());
    }

    #[tokio::test]
    async fn test_listing_events_for_a_reused_node_are_dropped() {
        let mut f = fixture().await;
        fs::create_dir(f.remote.path().join("a")).unwrap();
        fs::write(f.remote.path().join("f.txt"), b"f").unwrap();

        let root = f.pane.tree(BackendKind::Remote).root();
        f.pane.expand(BackendKind::Remote, root).await.unwrap();
        let a = f.pane.tree(BackendKind::Remote).find_path("a").unwrap();
        let a_path = f.pane.resolve_path(BackendKind::Remote, a).unwrap();

        // The listing of `a` is still in flight while the pane reloads without it
        fs::remove_dir(f.remote.path().join("a")).unwrap();
        fs::write(f.remote.path().join("g.txt"), b"g").unwrap();
        fs::write(f.remote.path().join("h.txt"), b"h").unwrap();
        f.pane.tree_mut(BackendKind::Remote).collapse(root);
        f.pane.expand(BackendKind::Remote, root).await.unwrap();

        let entries = parse_listing(&["-rw-r--r-- 1 u g 1.0K Jan 12 09:31 x.txt"]);
        let events = [
            TreeEvent::ListingStarted {
                backend: BackendKind::Remote,
                node: a,
                path: a_path.clone(),
            },
            TreeEvent::ListingBatch {
                backend: BackendKind::Remote,
                node: a,
                path: a_path.clone(),
                entries,
            },
            TreeEvent::ListingFinished {
                backend: BackendKind::Remote,
                node: a,
                path: a_path.clone(),
                total: 1,
            },
            TreeEvent::ListingFailed {
                backend: BackendKind::Remote,
                node: a,
                path: a_path,
                error: "gone".to_string(),
            },
        ];
        for event in events {
            f.pane.apply_tree_event(event);
        }

        let tree = f.pane.tree(BackendKind::Remote);
        assert_eq!(tree.child_names(root), vec!["f.txt", "g.txt", "h.txt"]);
        assert_eq!(tree.node(root).unwrap().state, ExpansionState::Expanded);
        for child in tree.children(root) {
            assert!(tree.node(*child).unwrap().children.is_empty());
        }
        assert_eq!(f.pane.status_message, None);
    }

    #[test]
    fn test_switch_panel_and_status() {
        let mut pane = DualPane::new(Arc::new(Connection::local_only()), "/", "/");
        assert_eq!(pane.active_panel, BackendKind::Local);
        pane.switch_panel();
        assert_eq!(pane.active_panel, BackendKind::Remote);

        pane.set_status_message("hello");
        pane.expire_status_message(Duration::from_secs(3600));
        assert_eq!(pane.status_message.as_deref(), Some("hello"));
        pane.expire_status_message(Duration::ZERO);
        assert!(pane.status_message.is_none());
    }
}
