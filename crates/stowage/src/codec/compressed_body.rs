//! Brotli-compressed upload bodies produced while the source is read.

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use super::BrotliStage;
use crate::backend::{BackendError, BodyStream};

/// Size and digest of a compressed body, reported once it has been fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDigest {
    /// Number of compressed bytes produced.
    pub size: u64,
    /// Hex-encoded SHA-256 of the compressed bytes.
    pub sha256: String,
}

struct CompressState<R> {
    source: ReaderStream<R>,
    stage: Option<BrotliStage>,
    hasher: Sha256,
    size: u64,
    digest: Option<oneshot::Sender<BodyDigest>>,
}

impl<R> CompressState<R> {
    fn record(&mut self, chunk: &Bytes) {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
    }

    fn report(&mut self) {
        if let Some(sender) = self.digest.take() {
            let digest = BodyDigest {
                size: self.size,
                sha256: hex::encode(self.hasher.clone().finalize()),
            };
            let _ = sender.send(digest);
        }
    }
}

/// Compresses everything read from `reader` into a body of unknown length.
///
/// The receiver resolves after the final chunk has been yielded. It is
/// dropped without a value when the body fails or is abandoned early.
pub fn compressed_body<R>(reader: R) -> (BodyStream, oneshot::Receiver<BodyDigest>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let state = CompressState {
        source: ReaderStream::new(reader),
        stage: Some(BrotliStage::new()),
        hasher: Sha256::new(),
        size: 0,
        digest: Some(sender),
    };

    let body = futures::stream::try_unfold(state, next_chunk);

    (body.map_err(BackendError::from).boxed(), receiver)
}

async fn next_chunk<R>(
    mut state: CompressState<R>,
) -> std::io::Result<Option<(Bytes, CompressState<R>)>>
where
    R: AsyncRead + Unpin,
{
    loop {
        let Some(stage) = state.stage.as_mut() else {
            return Ok(None);
        };

        let output = match state.source.next().await {
            Some(chunk) => {
                stage.push(&chunk?)?;
                stage.take_output()
            }
            None => {
                let output = match state.stage.take() {
                    Some(stage) => Bytes::from(stage.finish()?),
                    None => Bytes::new(),
                };
                state.record(&output);
                state.report();
                return Ok(Some((output, state)));
            }
        };

        // The encoder buffers internally and often has nothing to emit yet.
        if !output.is_empty() {
            state.record(&output);
            return Ok(Some((output, state)));
        }
    }
}
