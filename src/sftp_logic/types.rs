use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which storage domain a path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }

    /// The other pane's backend
    pub fn opposite(&self) -> Self {
        match self {
            BackendKind::Local => BackendKind::Remote,
            BackendKind::Remote => BackendKind::Local,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(format!("unknown backend '{}' (expected local or remote)", other)),
        }
    }
}

/// File or directory, derived from the first permission character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One file-system object parsed from a long-format listing line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name, never contains a path separator
    pub name: String,
    pub kind: EntryKind,
    /// Raw size token as printed by `ls -h` (e.g. `4.0K`, `160B`)
    pub size: String,
    /// `size` decoded with binary multipliers, `None` when undecodable
    pub size_bytes: Option<u64>,
    pub permissions: String,
    pub links: u64,
    pub owner: String,
    pub group: String,
    /// Display-only timestamp, either `Mon DD HH:MM` or `Mon DD YYYY`
    pub modified: String,
    /// Symlink target for `name -> target` lines
    pub link_target: Option<String>,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Type label shown next to the name: `folder`, the extension, or empty
    pub fn file_type(&self) -> &str {
        file_type_label(&self.name, self.kind)
    }
}

pub fn file_type_label(name: &str, kind: EntryKind) -> &str {
    if kind == EntryKind::Directory {
        return "folder";
    }
    match name.rfind('.') {
        Some(idx) => &name[idx + 1..],
        None => "",
    }
}

/// What to do when a file already exists at the mirror destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Leave the existing file untouched, regardless of content
    #[default]
    SkipExisting,
    Overwrite,
}

/// Copy or move when source and destination share a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameBackendMode {
    #[default]
    Copy,
    Move,
}

/// Captured output of a shell command on either backend
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Counters reported by a recursive upload or download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub files_copied: u64,
    pub files_skipped: u64,
    pub directories_created: u64,
    pub bytes: u64,
}

impl TransferStats {
    pub fn merge(&mut self, other: TransferStats) {
        self.files_copied += other.files_copied;
        self.files_skipped += other.files_skipped;
        self.directories_created += other.directories_created;
        self.bytes += other.bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_label() {
        assert_eq!(file_type_label("report.csv", EntryKind::File), "csv");
        assert_eq!(file_type_label("archive.tar.gz", EntryKind::File), "gz");
        assert_eq!(file_type_label("Makefile", EntryKind::File), "");
        assert_eq!(file_type_label("src.d", EntryKind::Directory), "folder");
    }

    #[test]
    fn test_backend_kind_round_trip() {
        assert_eq!("Remote".parse::<BackendKind>(), Ok(BackendKind::Remote));
        assert_eq!(BackendKind::Local.to_string(), "local");
        assert_eq!(BackendKind::Local.opposite(), BackendKind::Remote);
        assert!("ftp".parse::<BackendKind>().is_err());
    }
}
