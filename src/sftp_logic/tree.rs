//! Lazily populated directory tree for one pane
//!
//! Nodes live in an arena owned by the [`DirTree`]; a node refers to its
//! parent by [`NodeId`] and owns its children through the same ids. Removing
//! a node frees its whole subtree. Directories that have not been listed carry
//! a single placeholder child so a renderer can show an expand affordance.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

use super::connection::Transport;
use super::parser::{is_pseudo_entry, parse_listing};
use super::path_utils::join_path;
use super::transfer::{DragPayload, DropTarget};
use super::types::{BackendKind, DirectoryEntry, EntryKind};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEntry {
    Root,
    Entry(DirectoryEntry),
    /// Stand-in child of a directory that has not been listed yet
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpansionState {
    Collapsed,
    Expanded,
    EmptyDirectory,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub entry: NodeEntry,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub state: ExpansionState,
}

impl TreeNode {
    pub fn directory_entry(&self) -> Option<&DirectoryEntry> {
        match &self.entry {
            NodeEntry::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.entry == NodeEntry::Placeholder
    }

    /// Root and directory entries can be expanded and dropped onto
    pub fn is_directory(&self) -> bool {
        match &self.entry {
            NodeEntry::Root => true,
            NodeEntry::Entry(entry) => entry.is_dir(),
            NodeEntry::Placeholder => false,
        }
    }
}

/// A row of the flattened, currently expanded tree
#[derive(Debug, Clone, Serialize)]
pub struct VisibleRow {
    #[serde(skip)]
    pub id: NodeId,
    pub depth: usize,
    pub name: String,
    pub file_type: String,
    /// `--` for directories
    pub size: String,
    pub is_dir: bool,
    pub state: ExpansionState,
}

#[derive(Debug, Clone)]
pub struct DirTree {
    backend: BackendKind,
    root_path: String,
    nodes: Vec<Option<TreeNode>>,
    free: Vec<usize>,
    root: NodeId,
}

impl DirTree {
    pub fn new(backend: BackendKind, root_path: impl Into<String>) -> Self {
        let mut tree = Self {
            backend,
            root_path: root_path.into(),
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.alloc(TreeNode {
            entry: NodeEntry::Root,
            parent: None,
            children: Vec::new(),
            state: ExpansionState::Collapsed,
        });
        tree.add_placeholder(tree.root);
        tree
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Number of live nodes, placeholders included
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Names of the real (non-placeholder) children
    pub fn child_names(&self, id: NodeId) -> Vec<String> {
        self.children(id)
            .iter()
            .filter_map(|child| self.node(*child)?.directory_entry())
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id).iter().copied().find(|child| {
            self.node(*child)
                .and_then(TreeNode::directory_entry)
                .is_some_and(|entry| entry.name == name)
        })
    }

    /// Walk already cached children along a `/`-separated path relative to the root
    pub fn find_path(&self, relative: &str) -> Option<NodeId> {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self.root, |node, part| self.find_child(node, part))
    }

    /// Like [`find_path`](Self::find_path) for an absolute path under the root
    pub fn find_absolute(&self, path: &str) -> Option<NodeId> {
        let rest = path.strip_prefix(self.root_path.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') && !self.root_path.ends_with('/') {
            return None;
        }
        self.find_path(rest)
    }

    /// Absolute path of `id`: the root path joined with each name down to the node.
    ///
    /// Pure walk over cached names; `None` for placeholders and unknown ids.
    pub fn resolve_path(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = Some(id);

        while let Some(node_id) = current {
            let node = self.node(node_id)?;
            match &node.entry {
                NodeEntry::Root => break,
                NodeEntry::Entry(entry) => names.push(entry.name.as_str()),
                NodeEntry::Placeholder => return None,
            }
            current = node.parent;
        }

        let path = names
            .iter()
            .rev()
            .fold(self.root_path.clone(), |path, name| join_path(&path, name));
        Some(path)
    }

    fn alloc(&mut self, node: TreeNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn add_placeholder(&mut self, parent: NodeId) {
        let placeholder = self.alloc(TreeNode {
            entry: NodeEntry::Placeholder,
            parent: Some(parent),
            children: Vec::new(),
            state: ExpansionState::Collapsed,
        });
        if let Some(node) = self.node_mut(parent) {
            node.children.push(placeholder);
        }
    }

    /// Free every descendant of `id`, leaving it childless
    fn clear_children(&mut self, id: NodeId) {
        let mut pending: Vec<NodeId> = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        while let Some(child) = pending.pop() {
            if let Some(node) = self.nodes.get_mut(child.0).and_then(Option::take) {
                pending.extend(node.children);
                self.free.push(child.0);
            }
        }
    }

    fn expandable_path(&self, id: NodeId) -> Result<String> {
        let node = self
            .node(id)
            .ok_or_else(|| EngineError::NotADirectory(format!("unknown node {:?}", id)))?;
        let path = self
            .resolve_path(id)
            .ok_or_else(|| EngineError::NotADirectory("placeholder node".to_string()))?;
        if !node.is_directory() {
            return Err(EngineError::NotADirectory(path));
        }
        Ok(path)
    }

    /// Drop the current children of a directory node ahead of a new listing
    pub fn begin_expand(&mut self, id: NodeId) -> Result<()> {
        self.expandable_path(id)?;
        self.clear_children(id);
        Ok(())
    }

    /// Append one batch of listed entries as children of `id`
    pub fn append_entries(&mut self, id: NodeId, entries: &[DirectoryEntry]) -> Vec<NodeId> {
        if !self.node(id).is_some_and(TreeNode::is_directory) {
            debug!("Dropping {} entries addressed to non-directory {:?}", entries.len(), id);
            return Vec::new();
        }

        let mut added = Vec::with_capacity(entries.len());
        for entry in entries {
            if is_pseudo_entry(&entry.name) {
                continue;
            }
            let is_dir = entry.is_dir();
            let child = self.alloc(TreeNode {
                entry: NodeEntry::Entry(entry.clone()),
                parent: Some(id),
                children: Vec::new(),
                state: ExpansionState::Collapsed,
            });
            if is_dir {
                self.add_placeholder(child);
            }
            if let Some(node) = self.node_mut(id) {
                node.children.push(child);
            }
            added.push(child);
        }
        added
    }

    /// Settle the expansion state once every batch has been appended
    pub fn finish_expand(&mut self, id: NodeId) {
        if !self.node(id).is_some_and(TreeNode::is_directory) {
            return;
        }
        let has_entries = self
            .children(id)
            .iter()
            .any(|child| self.node(*child).is_some_and(|n| !n.is_placeholder()));
        if let Some(node) = self.node_mut(id) {
            node.state = if has_entries {
                ExpansionState::Expanded
            } else {
                ExpansionState::EmptyDirectory
            };
        }
    }

    /// List `id` on its backend and replace its children with the result.
    ///
    /// Directory children come back collapsed with one placeholder; files
    /// have no children. The node is left untouched if the listing fails.
    pub async fn expand(&mut self, id: NodeId, transport: &dyn Transport) -> Result<Vec<NodeId>> {
        let path = self.expandable_path(id)?;
        let lines = transport.list_directory(&path, self.backend).await?;
        let entries = parse_listing(&lines);
        debug!("Expanding {} ({}): {} entries", path, self.backend, entries.len());

        self.begin_expand(id)?;
        let children = self.append_entries(id, &entries);
        self.finish_expand(id);
        Ok(children)
    }

    /// Expand `id` and its subdirectories down to `depth` levels.
    ///
    /// `depth == 1` is a plain [`expand`](Self::expand); `0` does nothing.
    /// Directories on the last level keep their placeholder.
    pub async fn populate(
        &mut self,
        id: NodeId,
        depth: usize,
        transport: &dyn Transport,
    ) -> Result<()> {
        let mut pending = VecDeque::from([(id, depth)]);

        while let Some((node, depth)) = pending.pop_front() {
            if depth == 0 {
                continue;
            }
            for child in self.expand(node, transport).await? {
                if self.node(child).is_some_and(TreeNode::is_directory) {
                    pending.push_back((child, depth - 1));
                }
            }
        }
        Ok(())
    }

    /// Forget the children of a directory node and show it as unexpanded again
    pub fn collapse(&mut self, id: NodeId) {
        if !self.node(id).is_some_and(TreeNode::is_directory) {
            return;
        }
        self.clear_children(id);
        self.add_placeholder(id);
        if let Some(node) = self.node_mut(id) {
            node.state = ExpansionState::Collapsed;
        }
    }

    /// In-process drag payload for the entry at `id`
    pub fn drag_payload(&self, id: NodeId) -> Option<DragPayload> {
        let entry = self.node(id)?.directory_entry()?;
        Some(DragPayload {
            file_name: entry.name.clone(),
            backend: self.backend,
            path: self.resolve_path(id)?,
            is_dir: entry.is_dir(),
        })
    }

    /// Snapshot of `id` as a drop destination
    pub fn drop_target(&self, id: NodeId) -> Option<DropTarget> {
        let node = self.node(id)?;
        if node.is_placeholder() {
            return None;
        }
        let kind = if node.is_directory() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Some(DropTarget {
            backend: self.backend,
            path: self.resolve_path(id)?,
            kind,
            child_names: self.child_names(id),
        })
    }

    /// Depth-first rows of every listed entry under expanded nodes
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut rows = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = self
            .children(self.root)
            .iter()
            .rev()
            .map(|child| (*child, 0))
            .collect();

        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            let Some(entry) = node.directory_entry() else {
                continue;
            };
            rows.push(VisibleRow {
                id,
                depth,
                name: entry.name.clone(),
                file_type: entry.file_type().to_string(),
                size: if entry.is_dir() {
                    "--".to_string()
                } else {
                    entry.size.clone()
                },
                is_dir: entry.is_dir(),
                state: node.state,
            });
            if node.state == ExpansionState::Expanded {
                stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
            }
        }
        rows
    }
}
