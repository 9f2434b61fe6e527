//! File-manager engine: listing parser, backends, tree cache and transfers

pub mod connection;
pub mod filesystem;
pub mod local;
pub mod mirror;
pub mod parser;
pub mod path_utils;
pub mod remote;
pub mod state;
pub mod transfer;
pub mod tree;
pub mod types;
pub mod worker;

pub use connection::{AuthMethod, Connection, ConnectionSettings, Transport};
pub use state::DualPane;
pub use transfer::{DragPayload, DropTarget, TransferAction, TransferOutcome};
pub use tree::{DirTree, NodeId};
pub use types::{BackendKind, ConflictPolicy, DirectoryEntry, EntryKind, SameBackendMode};
