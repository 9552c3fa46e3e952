//! Payload streaming between a connection and local files.
//!
//! A payload has no length prefix: the receiver reads until the sender
//! half-closes, so a clean end of stream is how a transfer succeeds.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Result, TransferError};

/// Distinguishes partial files of concurrent transfers in this process
static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Copy everything up to end of stream into `dest`.
///
/// Bytes go to a partial file beside `dest` as they arrive and replace
/// `dest` only once the peer has closed cleanly. A failure part way
/// through removes the partial file and leaves any existing `dest`
/// unchanged.
pub async fn stream_to_file<R>(reader: &mut R, dest: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let part = part_path(dest);

    let result = match copy_to_file(reader, &part).await {
        Ok(n) => tokio::fs::rename(&part, dest)
            .await
            .map(|()| n)
            .map_err(TransferError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&part).await {
            debug!(path = %part.display(), error = %e, "Partial file not removed");
        }
    }
    result
}

async fn copy_to_file<R>(reader: &mut R, path: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(path).await?;
    let n = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    trace!(path = %path.display(), bytes = n, "Payload received");
    Ok(n)
}

/// Hidden sibling of `dest` that receives the payload in flight
fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(dest.file_name().unwrap_or_default());
    name.push(format!(
        ".part-{}-{}",
        std::process::id(),
        PART_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    dest.with_file_name(name)
}

/// Copy the whole of `src` to `writer` and flush.
pub async fn stream_from_file<W>(writer: &mut W, src: &Path) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut file = open_file(src).await?;
    send_file(writer, &mut file).await
}

/// Open a regular file for sending.
///
/// A missing path, or one naming a directory, is `FileNotFound`.
pub async fn open_file(path: &Path) -> Result<File> {
    let file = File::open(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => TransferError::FileNotFound(path.to_path_buf()),
        _ => TransferError::Io(e),
    })?;

    if file.metadata().await?.is_dir() {
        return Err(TransferError::FileNotFound(path.to_path_buf()));
    }

    Ok(file)
}

/// Copy an already opened file to `writer` and flush.
///
/// Split from `stream_from_file` so a caller can emit its status line
/// between opening the source and sending the bytes.
pub async fn send_file<W>(writer: &mut W, file: &mut File) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let n = tokio::io::copy(file, writer).await?;
    writer.flush().await?;
    Ok(n)
}
