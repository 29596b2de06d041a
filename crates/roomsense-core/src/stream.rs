// ── Reactive registry subscription ──
//
// Thin wrapper over a `watch::Receiver` of registry snapshots, so
// consumers can either poll the latest value or await changes without
// touching tokio channel types directly.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::DeviceReading;

type Snapshot = Arc<Vec<Arc<DeviceReading>>>;

/// A live subscription to the device registry.
///
/// Each change to the registry publishes a fresh immutable snapshot.
/// Intermediate snapshots may be skipped under load; the latest one is
/// always observable.
pub struct ReadingStream {
    receiver: watch::Receiver<Snapshot>,
}

impl ReadingStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        Self { receiver }
    }

    /// The most recent snapshot, without waiting.
    pub fn current(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next registry change and return the new snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Convert into a `Stream` of snapshots for combinator-style use.
    /// The first item is the current snapshot.
    pub fn into_stream(self) -> ReadingStreamAdapter {
        ReadingStreamAdapter {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `futures_core::Stream` adapter returned by [`ReadingStream::into_stream`].
pub struct ReadingStreamAdapter {
    inner: WatchStream<Snapshot>,
}

impl futures_core::Stream for ReadingStreamAdapter {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
