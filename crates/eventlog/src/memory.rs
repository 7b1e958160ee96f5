//! In-memory event log: a hermetic double for tests and local
//! development, mirroring Redis Streams' consumer-group semantics
//! (unacknowledged-entry pending lists, claim-on-idle) without a
//! backing process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledger_core::{AccountId, DomainResult, StreamId};
use ledger_events::{Event, LoggedEvent};
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;

use crate::subscription::SharedPoller;
use crate::{group_name, EventLog, Subscription};

const DEFAULT_READ_INTERVAL: Duration = Duration::from_millis(50);
const CHANNEL_CAPACITY: usize = 64;

struct PendingEntry {
    index: usize,
    consumer: String,
    delivered_at: Instant,
}

struct GroupState {
    next_index: usize,
    pending: HashMap<StreamId, PendingEntry>,
}

struct Inner<E: Event> {
    ids: HashMap<String, HashSet<String>>,
    versions: HashMap<String, u64>,
    entries: Vec<LoggedEvent<E>>,
    groups: HashMap<String, GroupState>,
    clock: u64,
}

impl<E: Event> Default for Inner<E> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            versions: HashMap::new(),
            entries: Vec::new(),
            groups: HashMap::new(),
            clock: 0,
        }
    }
}

/// In-memory stand-in for a Redis-backed event log, one stream per
/// instance. All state lives behind a single `RwLock`, which is fine at
/// test scale and keeps the optimistic-concurrency check trivially
/// linearizable.
#[derive(Clone)]
pub struct InMemoryEventLog<E: Event> {
    inner: Arc<RwLock<Inner<E>>>,
    read_interval: Duration,
    // One poller per stream, memoized per §4.1 so repeated `subscribe`
    // calls for the same stream share a single poll loop.
    subscriptions: Arc<RwLock<HashMap<String, Arc<SharedPoller<E>>>>>,
}

impl<E: Event> Default for InMemoryEventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> InMemoryEventLog<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            read_interval: DEFAULT_READ_INTERVAL,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_read_interval(read_interval: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            read_interval,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl<E: Event> EventLog<E> for InMemoryEventLog<E> {
    async fn add_id(&self, id: &AccountId, namespace: &str) -> DomainResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .ids
            .entry(namespace.to_string())
            .or_default()
            .insert(id.as_str().to_string()))
    }

    async fn publish(&self, _stream: &str, event: E) -> DomainResult<Option<(u64, StreamId)>> {
        let mut inner = self.inner.write().await;

        let key = event.account_id().as_str().to_string();
        let expected = event.version();
        match inner.versions.get(&key).copied() {
            Some(current) if current != expected => return Ok(None),
            // Open question (§9): a key absent is only compatible with the
            // first `create`, published at version 0. Any later event
            // arriving with an absent key is treated as a lost race rather
            // than silently accepted.
            None if expected != 0 => return Ok(None),
            _ => {}
        }

        let new_version = expected + 1;
        inner.clock += 1;
        let timestamp = StreamId::new(inner.clock, 0);
        inner.versions.insert(key, new_version);
        inner
            .entries
            .push(LoggedEvent::new(timestamp, event.with_version(new_version)));

        Ok(Some((new_version, timestamp)))
    }

    async fn get(
        &self,
        _stream: &str,
        id: &AccountId,
        since_timestamp: StreamId,
    ) -> DomainResult<Vec<LoggedEvent<E>>> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.timestamp > since_timestamp && e.account_id() == id)
            .cloned()
            .collect())
    }

    async fn subscribe(&self, stream: &str, consumer_name: &str) -> DomainResult<Subscription<E>> {
        let group = group_name(stream);
        {
            let mut inner = self.inner.write().await;
            inner.groups.entry(group.clone()).or_insert(GroupState {
                next_index: 0,
                pending: HashMap::new(),
            });
        }

        if let Some(poller) = self.subscriptions.read().await.get(stream) {
            return Ok(poller.subscribe_handle());
        }

        let mut subs = self.subscriptions.write().await;
        if let Some(poller) = subs.get(stream) {
            return Ok(poller.subscribe_handle());
        }

        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        let tx_task = tx.clone();
        let inner = Arc::clone(&self.inner);
        let consumer_name = consumer_name.to_string();
        let read_interval = self.read_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(read_interval);
            loop {
                ticker.tick().await;
                let batch = {
                    let mut guard = inner.write().await;
                    let Some(state) = guard.groups.get_mut(&group) else {
                        break;
                    };
                    let start = state.next_index;
                    if start >= guard.entries.len() {
                        continue;
                    }
                    let batch: Vec<LoggedEvent<E>> = guard.entries[start..].to_vec();
                    let now = Instant::now();
                    for (offset, entry) in batch.iter().enumerate() {
                        state.pending.insert(
                            entry.timestamp,
                            PendingEntry {
                                index: start + offset,
                                consumer: consumer_name.clone(),
                                delivered_at: now,
                            },
                        );
                    }
                    state.next_index = guard.entries.len();
                    batch
                };
                if !batch.is_empty() {
                    // No receivers yet is not fatal: a later `subscribe`
                    // call attaches to this same poller via the cache.
                    let _ = tx_task.send(batch);
                }
            }
        });

        let poller = SharedPoller::spawn(task, tx);
        let handle = poller.subscribe_handle();
        subs.insert(stream.to_string(), poller);
        Ok(handle)
    }

    async fn ack(&self, stream: &str, timestamp: StreamId) -> DomainResult<u64> {
        let group = group_name(stream);
        let mut inner = self.inner.write().await;
        let Some(state) = inner.groups.get_mut(&group) else {
            return Ok(0);
        };
        Ok(if state.pending.remove(&timestamp).is_some() {
            1
        } else {
            0
        })
    }

    async fn get_pending(
        &self,
        stream: &str,
        consumer_name: &str,
        max_elapsed: Duration,
    ) -> DomainResult<Vec<LoggedEvent<E>>> {
        let group = group_name(stream);
        let mut inner = self.inner.write().await;
        let entries_snapshot = inner.entries.clone();
        let Some(state) = inner.groups.get_mut(&group) else {
            return Ok(vec![]);
        };

        let now = Instant::now();
        let mut claimed = Vec::new();
        for pending in state.pending.values_mut() {
            if now.duration_since(pending.delivered_at) >= max_elapsed {
                pending.consumer = consumer_name.to_string();
                pending.delivered_at = now;
                if let Some(entry) = entries_snapshot.get(pending.index) {
                    claimed.push(entry.clone());
                }
            }
        }
        claimed.sort_by_key(|e| e.timestamp);
        Ok(claimed)
    }

    async fn close(&self) -> DomainResult<()> {
        let mut subs = self.subscriptions.write().await;
        for (_, poller) in subs.drain() {
            poller.stop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_account::AccountEvent;
    use std::time::Duration as StdDuration;
    use tokio::time::sleep;

    fn id(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[tokio::test]
    async fn publish_assigns_sequential_versions() {
        let log = InMemoryEventLog::<AccountEvent>::new();
        let acc = id("acct-1");

        let (v1, _) = log
            .publish("accountStream", AccountEvent::create(acc.clone(), 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v1, 1);

        let (v2, _) = log
            .publish("accountStream", AccountEvent::deposit(acc.clone(), 1, 100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn publish_loses_race_on_stale_version() {
        let log = InMemoryEventLog::<AccountEvent>::new();
        let acc = id("acct-1");

        log.publish("accountStream", AccountEvent::create(acc.clone(), 0))
            .await
            .unwrap();

        // Two handlers both think the current version is 1.
        let first = log
            .publish("accountStream", AccountEvent::deposit(acc.clone(), 1, 10))
            .await
            .unwrap();
        let second = log
            .publish("accountStream", AccountEvent::deposit(acc.clone(), 1, 10))
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn publish_rejects_non_create_when_key_absent() {
        let log = InMemoryEventLog::<AccountEvent>::new();
        let acc = id("acct-1");

        let result = log
            .publish("accountStream", AccountEvent::deposit(acc, 1, 10))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn add_id_is_true_only_on_first_insert() {
        let log = InMemoryEventLog::<AccountEvent>::new();
        let acc = id("acct-1");
        assert!(log.add_id(&acc, "accountId").await.unwrap());
        assert!(!log.add_id(&acc, "accountId").await.unwrap());
    }

    #[tokio::test]
    async fn subscribe_delivers_published_batches_and_pending_reclaims_on_idle() {
        let log = InMemoryEventLog::<AccountEvent>::with_read_interval(StdDuration::from_millis(5));
        let acc = id("acct-1");
        log.publish("accountStream", AccountEvent::create(acc.clone(), 0))
            .await
            .unwrap();

        let mut sub = log.subscribe("accountStream", "consumer-a").await.unwrap();
        let batch = sub.recv().await.unwrap();
        assert_eq!(batch.len(), 1);

        // Not yet acknowledged: a pending sweep with a near-zero idle
        // threshold should reclaim it for a different consumer.
        sleep(StdDuration::from_millis(10)).await;
        let reclaimed = log
            .get_pending("accountStream", "consumer-b", StdDuration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);

        let acked = log.ack("accountStream", reclaimed[0].timestamp).await.unwrap();
        assert_eq!(acked, 1);
        let acked_again = log.ack("accountStream", reclaimed[0].timestamp).await.unwrap();
        assert_eq!(acked_again, 0);
    }

    #[tokio::test]
    async fn get_pending_on_unknown_group_is_empty() {
        let log = InMemoryEventLog::<AccountEvent>::new();
        let pending = log
            .get_pending("accountStream", "consumer-a", StdDuration::from_secs(1))
            .await
            .unwrap();
        assert!(pending.is_empty());
    }
}
