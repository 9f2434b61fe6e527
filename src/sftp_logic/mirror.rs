//! Recursive copy between two [`Filesystem`]s
//!
//! Upload and download are the same algorithm with the arguments swapped.
//! Directories are created when absent, then every child is mirrored. Files
//! follow the [`ConflictPolicy`]. A failure aborts the current call; siblings
//! already copied stay in place.

use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::filesystem::Filesystem;
use super::path_utils::join_path;
use super::types::{ConflictPolicy, EntryKind, TransferStats};
use crate::error::{EngineError, Result};

type MirrorFuture<'a> = Pin<Box<dyn Future<Output = Result<TransferStats>> + Send + 'a>>;

/// Mirror the file or directory at `src_path` onto `dst_path`
pub async fn mirror(
    src: &dyn Filesystem,
    src_path: &str,
    dst: &dyn Filesystem,
    dst_path: &str,
    policy: ConflictPolicy,
) -> Result<TransferStats> {
    let kind = src.stat(src_path).await?.ok_or_else(|| {
        EngineError::Io(std::io::Error::new(
            ErrorKind::NotFound,
            format!("{} does not exist", src_path),
        ))
    })?;

    let stats = mirror_entry(src, src_path, kind, dst, dst_path, policy).await?;
    info!(
        "Mirrored {} -> {}: {} copied, {} skipped, {} dirs created",
        src_path, dst_path, stats.files_copied, stats.files_skipped, stats.directories_created
    );
    Ok(stats)
}

fn mirror_entry<'a>(
    src: &'a dyn Filesystem,
    src_path: &'a str,
    kind: EntryKind,
    dst: &'a dyn Filesystem,
    dst_path: &'a str,
    policy: ConflictPolicy,
) -> MirrorFuture<'a> {
    Box::pin(async move {
        match kind {
            EntryKind::Directory => mirror_dir(src, src_path, dst, dst_path, policy).await,
            EntryKind::File => mirror_file(src, src_path, dst, dst_path, policy).await,
        }
    })
}

async fn mirror_dir(
    src: &dyn Filesystem,
    src_path: &str,
    dst: &dyn Filesystem,
    dst_path: &str,
    policy: ConflictPolicy,
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();

    match dst.stat(dst_path).await? {
        None => {
            dst.mkdir(dst_path).await?;
            stats.directories_created += 1;
        }
        Some(EntryKind::Directory) => {}
        Some(EntryKind::File) => return Err(EngineError::NotADirectory(dst_path.to_string())),
    }

    for child in src.read_dir(src_path).await? {
        let child_src = join_path(src_path, &child.name);
        let child_dst = join_path(dst_path, &child.name);
        let child_stats =
            mirror_entry(src, &child_src, child.kind, dst, &child_dst, policy).await?;
        stats.merge(child_stats);
    }

    Ok(stats)
}

async fn mirror_file(
    src: &dyn Filesystem,
    src_path: &str,
    dst: &dyn Filesystem,
    dst_path: &str,
    policy: ConflictPolicy,
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();

    if policy == ConflictPolicy::SkipExisting && dst.stat(dst_path).await?.is_some() {
        debug!("Skipping {}: destination exists", dst_path);
        stats.files_skipped += 1;
        return Ok(stats);
    }

    let mut reader = src.open_read(src_path).await?;
    let mut writer = dst.open_write(dst_path).await?;
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.shutdown().await?;

    debug!("Copied {} bytes {} -> {}", bytes, src_path, dst_path);
    stats.files_copied += 1;
    stats.bytes += bytes;
    Ok(stats)
}
