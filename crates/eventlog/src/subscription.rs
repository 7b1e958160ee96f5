use std::sync::Arc;

use ledger_events::{Event, LoggedEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of the broadcast channel every shared poller delivers
/// through. Lagging this far behind drops the oldest buffered batches
/// for that one receiver (see `Subscription::recv`); it does not affect
/// other subscribers or the consumer group's own pending-entry
/// tracking, which is what actually guarantees delivery.
const CHANNEL_CAPACITY: usize = 64;

/// The background poll loop backing every `subscribe` call for a given
/// stream. spec.md §4.1: "A single subscription per (stream, group) is
/// memoized" — backends keep one `SharedPoller` per stream in a cache
/// and hand out a fresh broadcast receiver on every `subscribe` call
/// instead of spawning a second poll loop.
pub(crate) struct SharedPoller<E: Event> {
    sender: broadcast::Sender<Vec<LoggedEvent<E>>>,
    task: JoinHandle<()>,
}

impl<E: Event> SharedPoller<E> {
    pub(crate) fn spawn(task: JoinHandle<()>, sender: broadcast::Sender<Vec<LoggedEvent<E>>>) -> Arc<Self> {
        Arc::new(Self { sender, task })
    }

    /// A fresh `Subscription` reading from this poller, for a new
    /// `subscribe` call that memoized onto an already-running poller.
    pub(crate) fn subscribe_handle(self: &Arc<Self>) -> Subscription<E> {
        Subscription {
            receiver: self.sender.subscribe(),
            poller: Arc::clone(self),
        }
    }

    pub(crate) fn stop(&self) {
        self.task.abort();
    }
}

/// A live handle to a stream's (possibly shared) consumer-group
/// subscription.
///
/// Multiple `Subscription`s for the same stream are backed by the same
/// `SharedPoller` (memoized per (stream, group) per §4.1); dropping one
/// handle does not stop the poller for the others still holding a
/// handle into it — only an explicit `stop()` (or the owning
/// `EventLog::close`) tears the poll loop down.
pub struct Subscription<E: Event> {
    receiver: broadcast::Receiver<Vec<LoggedEvent<E>>>,
    poller: Arc<SharedPoller<E>>,
}

impl<E: Event> Subscription<E> {
    /// Wait for the next non-empty batch. Returns `None` once the
    /// poller has stopped for good. A handle that falls behind the
    /// broadcast buffer (`Lagged`) simply resumes from the oldest
    /// batch still buffered rather than ending the subscription — the
    /// consumer group's pending list, not this channel, is the source
    /// of truth for what still needs delivering.
    pub async fn recv(&mut self) -> Option<Vec<LoggedEvent<E>>> {
        loop {
            match self.receiver.recv().await {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop the underlying poller. Since the poller is shared with any
    /// other `Subscription` handle memoized onto the same stream, this
    /// stops delivery for all of them, not just this handle.
    pub fn stop(&self) {
        self.poller.stop();
    }
}
