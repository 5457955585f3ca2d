//! Brotli compression of upload payloads.
//!
//! Uploads are prepared ahead of serving, so the encoder always runs at the
//! highest quality. [`compress`] works on whole buffers, [`BrotliStage`] is
//! the incremental form used when compression feeds a streaming upload.

use std::io::{Read, Write};

use bytes::Bytes;

mod compressed_body;

pub use compressed_body::{BodyDigest, compressed_body};

/// Highest brotli quality level.
pub const BEST_COMPRESSION: u32 = 11;

/// Base-2 logarithm of the sliding window size.
const WINDOW_LOG: u32 = 22;

/// Internal buffer size of the encoder and decoder.
const BUFFER_SIZE: usize = 64 * 1024;

/// Compresses `data` in one shot.
pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stage = BrotliStage::new();
    stage.push(data)?;
    stage.finish()
}

/// Decompresses a brotli stream produced by [`compress`] or [`BrotliStage`].
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len().saturating_mul(4));
    brotli::Decompressor::new(data, BUFFER_SIZE).read_to_end(&mut output)?;
    Ok(output)
}

/// Incremental brotli encoder.
///
/// Input is pushed chunk by chunk; whatever compressed output the encoder has
/// produced so far can be drained with [`take_output`](Self::take_output)
/// while the rest of the input is still being read.
pub struct BrotliStage {
    encoder: brotli::CompressorWriter<Vec<u8>>,
}

impl BrotliStage {
    /// Creates an encoder at [`BEST_COMPRESSION`].
    pub fn new() -> Self {
        Self {
            encoder: brotli::CompressorWriter::new(
                Vec::new(),
                BUFFER_SIZE,
                BEST_COMPRESSION,
                WINDOW_LOG,
            ),
        }
    }

    /// Feeds a chunk of uncompressed input.
    pub fn push(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.encoder.write_all(chunk)
    }

    /// Drains the compressed bytes produced so far.
    pub fn take_output(&mut self) -> Bytes {
        Bytes::from(std::mem::take(self.encoder.get_mut()))
    }

    /// Completes the stream and returns the remaining compressed bytes.
    pub fn finish(mut self) -> std::io::Result<Vec<u8>> {
        self.encoder.flush()?;
        Ok(self.encoder.into_inner())
    }
}

impl Default for BrotliStage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BrotliStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrotliStage")
            .field("quality", &BEST_COMPRESSION)
            .field("window_log", &WINDOW_LOG)
            .finish()
    }
}
