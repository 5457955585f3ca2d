//! Streaming reader that computes SHA-256 and a byte count on-the-fly.

use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, ReadBuf};

pin_project! {
    /// An async reader wrapper that hashes and counts the bytes flowing through.
    ///
    /// Downloads use it to report the digest of what was written without a
    /// second pass over the file.
    pub struct HashingReader<R> {
        #[pin]
        inner: R,
        hasher: Sha256,
        bytes_read: u64,
    }
}

impl<R> HashingReader<R> {
    /// Creates a new hashing reader wrapping the given reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_read: 0,
        }
    }

    /// Returns the number of bytes read so far.
    #[inline]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consumes the reader and returns the SHA-256 hash as a hex string.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: AsyncRead> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();

        match this.inner.poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let new_bytes = &buf.filled()[before..];
                if !new_bytes.is_empty() {
                    this.hasher.update(new_bytes);
                    *this.bytes_read += new_bytes.len() as u64;
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Returns the hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_hashing_reader_empty() {
        let data: &[u8] = &[];
        let reader = HashingReader::new(data);

        assert_eq!(reader.bytes_read(), 0);
        assert_eq!(
            reader.finalize_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_hashing_reader_matches_digest() {
        let data = b"hello world".repeat(1000);
        let mut reader = HashingReader::new(&data[..]);

        let mut output = Vec::new();
        reader.read_to_end(&mut output).await.unwrap();

        assert_eq!(output, data);
        assert_eq!(reader.bytes_read(), data.len() as u64);
        assert_eq!(reader.finalize_hex(), sha256_hex(&data));
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
