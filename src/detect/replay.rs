//! Peek-and-replay stream wrapper

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Yields an already-consumed first chunk, then the rest of `inner`.
    pub struct ReplayStream<S> {
        head: Option<Bytes>,
        #[pin]
        inner: S,
    }
}

impl<S> ReplayStream<S> {
    pub fn new(head: Bytes, inner: S) -> Self {
        Self {
            head: Some(head),
            inner,
        }
    }
}

impl<S> Stream for ReplayStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if let Some(head) = this.head.take() {
            return Poll::Ready(Some(Ok(head)));
        }
        this.inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let extra = usize::from(self.head.is_some());
        let (lower, upper) = self.inner.size_hint();
        (
            lower.saturating_add(extra),
            upper.and_then(|u| u.checked_add(extra)),
        )
    }
}
