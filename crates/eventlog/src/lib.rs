//! Event Log Client: the abstraction both the command service and the
//! projector build on. Wraps an ordered, append-only log that offers
//! watch-guarded optimistic concurrency over a key/value namespace,
//! consumer groups with pending-entry reclaim, and entry claim transfer
//! — concretely, Redis Streams (`redis_log`) for production and an
//! in-memory double (`memory`) for hermetic tests.

pub mod memory;
pub mod redis_log;
pub mod subscription;

pub use memory::InMemoryEventLog;
pub use redis_log::RedisEventLog;
pub use subscription::Subscription;

use std::time::Duration;

use async_trait::async_trait;
use ledger_core::{AccountId, DomainResult, StreamId};
use ledger_events::{Event, LoggedEvent};

/// The consumer group every subscriber of a stream shares, derived from
/// the stream name (§4.1: "the consumer group `<stream>Group`").
pub fn group_name(stream: &str) -> String {
    format!("{stream}Group")
}

#[async_trait]
pub trait EventLog<E: Event>: Send + Sync {
    /// Insert `id` into the named id set. Returns `true` iff it was newly
    /// added — used by `create` to enforce account-id uniqueness.
    async fn add_id(&self, id: &AccountId, namespace: &str) -> DomainResult<bool>;

    /// Attempt to append `event` to `stream` under optimistic
    /// concurrency. `event.version()` is the version the caller expects
    /// to be current; on success the log stamps and returns the
    /// *assigned* version together with the position it was written at.
    /// Returns `Ok(None)` — not an error — when a concurrent publisher
    /// won the race; the caller decides whether that is a conflict to
    /// surface or something to retry.
    async fn publish(&self, stream: &str, event: E) -> DomainResult<Option<(u64, StreamId)>>;

    /// All entries in `stream` for `id` strictly newer than
    /// `since_timestamp`, in log order.
    async fn get(
        &self,
        stream: &str,
        id: &AccountId,
        since_timestamp: StreamId,
    ) -> DomainResult<Vec<LoggedEvent<E>>>;

    /// Join `stream`'s consumer group as `consumer_name`, creating the
    /// group if this is the first subscriber. Returns a handle that
    /// yields non-empty batches of newly delivered entries. A single
    /// subscription per (stream, group) is memoized: a second call for
    /// the same stream attaches to the already-running poll loop rather
    /// than starting a new one, and stops only when explicitly stopped
    /// or the log is closed.
    async fn subscribe(&self, stream: &str, consumer_name: &str) -> DomainResult<Subscription<E>>;

    /// Acknowledge the entry at `timestamp` in `stream`'s consumer
    /// group. Returns the number of entries acknowledged (1 for a
    /// caller's own, still-pending entry; 0 if already acknowledged).
    async fn ack(&self, stream: &str, timestamp: StreamId) -> DomainResult<u64>;

    /// List and reclaim pending entries idle at least `max_elapsed`,
    /// transferring ownership to `consumer_name`. Returns the reclaimed
    /// entries, decoded. An empty list (rather than an error) if the
    /// group does not exist yet — a projector that restarts before
    /// anything was ever published should not treat that as a failure.
    async fn get_pending(
        &self,
        stream: &str,
        consumer_name: &str,
        max_elapsed: Duration,
    ) -> DomainResult<Vec<LoggedEvent<E>>>;

    /// Stop all background polling and release backend resources.
    async fn close(&self) -> DomainResult<()>;
}
