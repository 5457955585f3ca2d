//! Lazy, cancellable stream over a prefix listing.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::stream::FusedStream;
use futures::{Stream, StreamExt};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::WaitForCancellationFutureOwned;

use super::CallContext;
use crate::backend::ListStream;
use crate::object::ObjectInfo;
use crate::{Error, Result, TRACING_TARGET_OBJECTS};

/// Objects under a prefix, fetched page by page as the stream is polled.
///
/// The stream ends after the first error. Cancelling the [`CallContext`] or
/// reaching its deadline yields [`Error::Cancelled`] or
/// [`Error::DeadlineExceeded`] and ends the stream. Dropping it stops
/// fetching further pages.
#[must_use = "streams do nothing unless polled"]
pub struct ObjectListing {
    inner: ListStream,
    prefix: String,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    deadline_at: Option<Instant>,
    deadline: Option<Pin<Box<Sleep>>>,
    yielded: usize,
    done: bool,
}

impl ObjectListing {
    pub(crate) fn new(inner: ListStream, prefix: &str, ctx: &CallContext) -> Self {
        Self {
            inner,
            prefix: prefix.to_string(),
            cancelled: Box::pin(ctx.token().clone().cancelled_owned()),
            deadline_at: ctx.deadline(),
            deadline: None,
            yielded: 0,
            done: false,
        }
    }

    /// Returns the prefix being listed.
    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn finish(&mut self, item: Option<Result<ObjectInfo>>) -> Poll<Option<Result<ObjectInfo>>> {
        self.done = true;
        tracing::debug!(
            target: TRACING_TARGET_OBJECTS,
            prefix = %self.prefix,
            count = self.yielded,
            failed = item.is_some(),
            "Listing finished"
        );
        Poll::Ready(item)
    }
}

impl Stream for ObjectListing {
    type Item = Result<ObjectInfo>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            return this.finish(Some(Err(Error::Cancelled)));
        }

        // The timer needs a runtime, so it is armed on first poll.
        if let Some(at) = this.deadline_at.take() {
            this.deadline = Some(Box::pin(tokio::time::sleep_until(at)));
        }
        if let Some(deadline) = this.deadline.as_mut()
            && deadline.as_mut().poll(cx).is_ready()
        {
            return this.finish(Some(Err(Error::DeadlineExceeded)));
        }

        loop {
            match ready!(this.inner.poll_next_unpin(cx)) {
                // The store may match more loosely than a plain string prefix.
                Some(Ok(info)) if !info.key.starts_with(&this.prefix) => continue,
                Some(Ok(info)) => {
                    this.yielded += 1;
                    return Poll::Ready(Some(Ok(info)));
                }
                Some(Err(err)) => {
                    let err = Error::list(this.prefix.clone(), err);
                    return this.finish(Some(Err(err)));
                }
                None => return this.finish(None),
            }
        }
    }
}

impl FusedStream for ObjectListing {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl std::fmt::Debug for ObjectListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectListing")
            .field("prefix", &self.prefix)
            .field("yielded", &self.yielded)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
