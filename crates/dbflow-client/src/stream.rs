//! Row streams that keep their handle's serialization lock.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::driver::Driver;
use crate::lock::LockGuard;

pin_project! {
    /// A driver row stream bundled with the lock guard of the handle that
    /// produced it.
    ///
    /// Dropping the stream releases the lock, allowing the next queued
    /// operation on the same handle to proceed.
    pub struct QueryStream<D: Driver> {
        #[pin]
        stream: D::RowStream,
        _guard: LockGuard,
    }
}

impl<D: Driver> QueryStream<D> {
    pub(crate) fn new(stream: D::RowStream, guard: LockGuard) -> Self {
        Self {
            stream,
            _guard: guard,
        }
    }
}

impl<D: Driver> Stream for QueryStream<D> {
    type Item = <D::RowStream as Stream>::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().stream.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}
