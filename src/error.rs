//! Engine error types

use thiserror::Error;

use crate::sftp_logic::types::BackendKind;

#[derive(Error, Debug)]
pub enum EngineError {
    /// One listing line did not match the long-format grammar. Callers skip it.
    #[error("Unparseable listing line: {0:?}")]
    Parse(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Remote session not connected")]
    NotConnected,

    #[error("{backend} command failed: {message}")]
    Execution {
        backend: BackendKind,
        message: String,
    },

    #[error("'{name}' already exists in {directory}")]
    Collision { name: String, directory: String },

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SFTP error: {0}")]
    Sftp(String),
}

impl EngineError {
    pub fn execution(backend: BackendKind, message: impl Into<String>) -> Self {
        EngineError::Execution {
            backend,
            message: message.into(),
        }
    }

    /// Transfers refused before touching either backend.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::Collision { .. } | EngineError::NotADirectory(_)
        )
    }

    /// Every engine error leaves the process usable; at worst a pane is stale.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl From<russh::Error> for EngineError {
    fn from(err: russh::Error) -> Self {
        EngineError::Connection(err.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for EngineError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        EngineError::Sftp(err.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let collision = EngineError::Collision {
            name: "report.csv".to_string(),
            directory: "/data".to_string(),
        };
        assert!(collision.is_rejection());
        assert!(EngineError::NotADirectory("/a.txt".to_string()).is_rejection());
        assert!(!EngineError::NotConnected.is_rejection());
    }

    #[test]
    fn test_execution_message_names_backend() {
        let err = EngineError::execution(BackendKind::Remote, "ls: cannot access");
        assert_eq!(err.to_string(), "remote command failed: ls: cannot access");
    }
}
