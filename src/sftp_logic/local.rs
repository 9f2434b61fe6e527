use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::{debug, warn};

use super::filesystem::{BoxedReader, BoxedWriter, DirChild, Filesystem};
use super::parser::is_pseudo_entry;
use super::types::{BackendKind, CommandOutput, EntryKind};
use crate::error::{EngineError, Result};

/// The local disk, driven through tokio's fs and process APIs
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    /// `mv from to`; moves directories without a recursive flag
    pub async fn move_path(&self, from: &str, to: &str) -> Result<()> {
        debug!("Local move {} -> {}", from, to);
        let output = Command::new("mv")
            .arg(from)
            .arg(to)
            .output()
            .await?;
        check_status(&output, "mv")
    }

    /// `cp -r from to`
    pub async fn copy_path(&self, from: &str, to: &str) -> Result<()> {
        debug!("Local copy {} -> {}", from, to);
        let output = Command::new("cp")
            .arg("-r")
            .arg(from)
            .arg(to)
            .output()
            .await?;
        check_status(&output, "cp")
    }
}

fn check_status(output: &std::process::Output, program: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(EngineError::execution(
        BackendKind::Local,
        format!("{} failed: {}", program, stderr.trim()),
    ))
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn long_listing(&self, path: &str) -> Result<Vec<String>> {
        let output = Command::new("ls")
            .arg("-alh")
            .arg(path)
            .env("LC_ALL", "C")
            .output()
            .await?;
        check_status(&output, "ls")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().map(str::to_string).collect())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirChild>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut children = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_pseudo_entry(&name) {
                continue;
            }
            // Follows symlinks, so a link to a directory is walked as one
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("Skipping dangling link {}", entry.path().display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let kind = if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            children.push(DirChild { name, kind });
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn stat(&self, path: &str) -> Result<Option<EntryKind>> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(EntryKind::Directory)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn open_read(&self, path: &str) -> Result<BoxedReader> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> Result<BoxedWriter> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("Local command: {}", command);
        let output = Command::new("sh").arg("-c").arg(command).output().await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_status: output.status.code().map(|code| code as u32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp_logic::parser::parse_listing;
    use tempfile::TempDir;

    fn path_str(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_long_listing_parses_into_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub dir")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let fs = LocalFs::new();
        let lines = fs
            .long_listing(dir.path().to_str().unwrap())
            .await
            .unwrap();
        let entries = parse_listing(&lines);

        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "sub dir".to_string()]);
        let sub = entries.iter().find(|e| e.name == "sub dir").unwrap();
        assert!(sub.is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_dir_follows_directory_links() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::fs::write(dir.path().join("real/f.txt"), b"f").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling"))
            .unwrap();

        let fs = LocalFs::new();
        let children = fs.read_dir(dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(
            children,
            vec![
                DirChild {
                    name: "link".to_string(),
                    kind: EntryKind::Directory
                },
                DirChild {
                    name: "real".to_string(),
                    kind: EntryKind::Directory
                },
            ]
        );

        let out = TempDir::new().unwrap();
        let stats = crate::sftp_logic::mirror::mirror(
            &fs,
            &path_str(&dir, "link"),
            &fs,
            &path_str(&out, "copy"),
            crate::sftp_logic::types::ConflictPolicy::SkipExisting,
        )
        .await
        .unwrap();
        assert_eq!(stats.files_copied, 1);
        assert_eq!(std::fs::read(out.path().join("copy/f.txt")).unwrap(), b"f");
    }

    #[tokio::test]
    async fn test_long_listing_of_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let err = LocalFs::new()
            .long_listing(&path_str(&dir, "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_stat_and_read_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("file.bin"), b"x").unwrap();
        let fs = LocalFs::new();

        assert_eq!(
            fs.stat(&path_str(&dir, "nested")).await.unwrap(),
            Some(EntryKind::Directory)
        );
        assert_eq!(
            fs.stat(&path_str(&dir, "file.bin")).await.unwrap(),
            Some(EntryKind::File)
        );
        assert_eq!(fs.stat(&path_str(&dir, "nope")).await.unwrap(), None);

        let children = fs.read_dir(dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(
            children,
            vec![
                DirChild { name: "file.bin".to_string(), kind: EntryKind::File },
                DirChild { name: "nested".to_string(), kind: EntryKind::Directory },
            ]
        );
    }

    #[tokio::test]
    async fn test_move_path_moves_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/inner")).unwrap();
        std::fs::write(dir.path().join("src/inner/f.txt"), b"data").unwrap();
        std::fs::create_dir(dir.path().join("dest")).unwrap();

        LocalFs::new()
            .move_path(&path_str(&dir, "src"), &path_str(&dir, "dest/src"))
            .await
            .unwrap();

        assert!(!dir.path().join("src").exists());
        assert_eq!(
            std::fs::read(dir.path().join("dest/src/inner/f.txt")).unwrap(),
            b"data"
        );
    }

    #[tokio::test]
    async fn test_execute_reports_exit_status() {
        let fs = LocalFs::new();
        let ok = fs.execute("echo hi").await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hi");

        let failed = fs.execute("exit 3").await.unwrap();
        assert_eq!(failed.exit_status, Some(3));
    }
}
