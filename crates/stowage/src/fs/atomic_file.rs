//! Atomic replacement of local files.
//!
//! Content is written to a uniquely named sibling of the destination and
//! renamed over it once fully written and synced. Readers of the destination
//! observe either the previous content or the new content, never a mix.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::TRACING_TARGET_FS;

/// Writes everything read from `reader` to `dest`, atomically.
///
/// On any failure the temporary file is removed and `dest` is left exactly as
/// it was. Returns the number of bytes written.
pub async fn write_atomic<R>(dest: &Path, reader: &mut R) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("destination '{}' has no file name", dest.display()),
            )
        })?;

    // Random suffix keeps concurrent writers to the same destination apart.
    let temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    tracing::debug!(
        target: TRACING_TARGET_FS,
        dest = %dest.display(),
        temp = %temp.path().display(),
        "Writing temporary file"
    );

    let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);
    let written = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    temp.persist(dest).map_err(|e| e.error)?;

    tracing::debug!(
        target: TRACING_TARGET_FS,
        dest = %dest.display(),
        size = written,
        "Replaced file atomically"
    );

    Ok(written)
}

/// Writes `data` to `dest`, atomically.
pub async fn write_atomic_bytes(dest: &Path, data: &[u8]) -> std::io::Result<u64> {
    let mut reader = data;
    write_atomic(dest, &mut reader).await
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    /// Yields `prefix` and then fails, like a connection dropped mid-transfer.
    struct BrokenReader {
        prefix: Option<Vec<u8>>,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            match self.prefix.take() {
                Some(prefix) => {
                    buf.put_slice(&prefix);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
            }
        }
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[tokio::test]
    async fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");

        let written = write_atomic_bytes(&dest, b"payload").await.unwrap();

        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.txt");
        std::fs::write(&dest, "old content that is longer").unwrap();

        write_atomic_bytes(&dest, b"new").await.unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.txt");
        std::fs::write(&dest, "original").unwrap();

        let mut reader = BrokenReader {
            prefix: Some(b"partial new data".to_vec()),
        };
        let err = write_atomic(&dest, &mut reader).await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "original");
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_failed_write_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("never.txt");

        let mut reader = BrokenReader { prefix: None };
        assert!(write_atomic(&dest, &mut reader).await.is_err());

        assert!(!dest.exists());
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_destination_without_file_name() {
        let err = write_atomic_bytes(Path::new("/"), b"x").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
