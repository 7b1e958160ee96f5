//! Redis Streams-backed event log.
//!
//! Each stream entry stores exactly one serialized `event` field (§6).
//! Optimistic concurrency is implemented with `WATCH`/`MULTI`/`EXEC` over
//! a per-account version key that shares nothing with the entry payload;
//! consumer-group delivery uses `XREADGROUP`, pending entries are swept
//! with `XPENDING`/`XCLAIM`.
//!
//! Per §9's open question about `watch` racing across a shared
//! connection: `publish` checks out a brand new connection for its
//! `WATCH`/`GET`/`MULTI`/`EXEC` sequence rather than reusing the
//! multiplexed connection the other operations share, so two concurrent
//! publishers for different accounts never contend over `WATCH` state
//! that belongs to a single connection.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledger_core::{AccountId, DomainError, DomainResult, StreamId};
use ledger_events::{Event, LoggedEvent};
use redis::AsyncCommands;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{instrument, warn};

use crate::subscription::SharedPoller;
use crate::{group_name, EventLog, Subscription};

const CHANNEL_CAPACITY: usize = 64;
const READ_COUNT: usize = 64;

/// Production `EventLog` backed by a single Redis stream plus a
/// key/value namespace for id registration and version keys.
#[derive(Clone)]
pub struct RedisEventLog<E: Event> {
    client: Arc<redis::Client>,
    shared: Arc<Mutex<redis::aio::MultiplexedConnection>>,
    read_interval: Duration,
    // One poller per stream, memoized per §4.1 so repeated `subscribe`
    // calls for the same stream share a single poll loop.
    subscriptions: Arc<RwLock<HashMap<String, Arc<SharedPoller<E>>>>>,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> RedisEventLog<E> {
    pub async fn connect(redis_url: &str, read_interval: Duration) -> DomainResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| DomainError::backend(format!("redis client: {e}")))?;
        let shared = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| DomainError::backend(format!("redis connect: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            shared: Arc::new(Mutex::new(shared)),
            read_interval,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            _event: PhantomData,
        })
    }

    fn version_key(id: &AccountId) -> String {
        format!("acct:{}:version", id.as_str())
    }

    #[instrument(skip(self), fields(stream = %stream), err)]
    async fn ensure_group(&self, stream: &str) -> DomainResult<()> {
        let mut conn = self.shared.lock().await;
        let result: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group_name(stream))
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(DomainError::backend(format!("XGROUP CREATE: {e}"))),
        }
    }
}

fn extract_event_field(fields: &[String]) -> DomainResult<&str> {
    for chunk in fields.chunks(2) {
        if let [field, value] = chunk {
            if field == "event" {
                return Ok(value);
            }
        }
    }
    Err(DomainError::backend("stream entry missing `event` field"))
}

fn decode_entry<E: Event>(entry_id: String, fields: Vec<String>) -> DomainResult<LoggedEvent<E>> {
    let timestamp: StreamId = entry_id.parse()?;
    let raw = extract_event_field(&fields)?;
    let payload: E =
        serde_json::from_str(raw).map_err(|e| DomainError::backend(format!("decode event: {e}")))?;
    Ok(LoggedEvent::new(timestamp, payload))
}

async fn read_new<E: Event>(
    conn: &mut redis::aio::MultiplexedConnection,
    stream: &str,
    group: &str,
    consumer: &str,
) -> DomainResult<Vec<LoggedEvent<E>>> {
    let reply: Option<Vec<(String, Vec<(String, Vec<String>)>)>> = redis::cmd("XREADGROUP")
        .arg("GROUP")
        .arg(group)
        .arg(consumer)
        .arg("COUNT")
        .arg(READ_COUNT)
        .arg("STREAMS")
        .arg(stream)
        .arg(">")
        .query_async(conn)
        .await
        .map_err(|e| DomainError::backend(format!("XREADGROUP: {e}")))?;

    let mut out = Vec::new();
    for (_name, entries) in reply.unwrap_or_default() {
        for (entry_id, fields) in entries {
            out.push(decode_entry(entry_id, fields)?);
        }
    }
    Ok(out)
}

#[async_trait]
impl<E: Event> EventLog<E> for RedisEventLog<E> {
    #[instrument(skip(self), fields(id = %id, namespace = %namespace), err)]
    async fn add_id(&self, id: &AccountId, namespace: &str) -> DomainResult<bool> {
        let mut conn = self.shared.lock().await;
        let added: i64 = conn
            .sadd(namespace, id.as_str())
            .await
            .map_err(|e| DomainError::backend(format!("SADD: {e}")))?;
        Ok(added == 1)
    }

    #[instrument(skip(self, event), fields(stream = %stream, account_id = %event.account_id(), expected_version = event.version()), err)]
    async fn publish(&self, stream: &str, event: E) -> DomainResult<Option<(u64, StreamId)>> {
        let key = Self::version_key(event.account_id());
        let expected = event.version();

        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| DomainError::backend(format!("redis connect: {e}")))?;

        redis::cmd("WATCH")
            .arg(&key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("WATCH: {e}")))?;

        let current: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("GET: {e}")))?;

        let matches = match current.as_deref() {
            Some(v) => {
                let parsed: u64 = v
                    .parse()
                    .map_err(|_| DomainError::backend(format!("corrupt version key {key}")))?;
                parsed == expected
            }
            // §9 open question: an absent key is only compatible with
            // the first `create` (proposed at version 0). Any later
            // event arriving to an absent key is a lost race, not an
            // implicit bootstrap.
            None => expected == 0,
        };

        if !matches {
            return Ok(None);
        }

        let new_version = expected + 1;
        let stamped = event.with_version(new_version);
        let payload = serde_json::to_string(&stamped)
            .map_err(|e| DomainError::backend(format!("serialize event: {e}")))?;

        redis::cmd("MULTI")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("MULTI: {e}")))?;
        redis::cmd("SET")
            .arg(&key)
            .arg(new_version)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("SET (queued): {e}")))?;
        redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("event")
            .arg(&payload)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("XADD (queued): {e}")))?;

        // `EXEC` replies `nil` (deserialized as `None` below) when the
        // watched key changed between `WATCH` and here — a concurrent
        // publisher won the race.
        let exec_result: Option<((), String)> = redis::cmd("EXEC")
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("EXEC: {e}")))?;

        match exec_result {
            None => Ok(None),
            Some((_, entry_id)) => {
                let timestamp: StreamId = entry_id.parse()?;
                Ok(Some((new_version, timestamp)))
            }
        }
    }

    #[instrument(skip(self), fields(stream = %stream, id = %id), err)]
    async fn get(
        &self,
        stream: &str,
        id: &AccountId,
        since_timestamp: StreamId,
    ) -> DomainResult<Vec<LoggedEvent<E>>> {
        let raw: Vec<(String, Vec<String>)> = {
            let mut conn = self.shared.lock().await;
            redis::cmd("XRANGE")
                .arg(stream)
                .arg(format!("({since_timestamp}"))
                .arg("+")
                .query_async(&mut *conn)
                .await
                .map_err(|e| DomainError::backend(format!("XRANGE: {e}")))?
        };

        let mut out = Vec::with_capacity(raw.len());
        for (entry_id, fields) in raw {
            let decoded: LoggedEvent<E> = decode_entry(entry_id, fields)?;
            if decoded.account_id() == id {
                out.push(decoded);
            }
        }
        Ok(out)
    }

    async fn subscribe(&self, stream: &str, consumer_name: &str) -> DomainResult<Subscription<E>> {
        self.ensure_group(stream).await?;

        if let Some(poller) = self.subscriptions.read().await.get(stream) {
            return Ok(poller.subscribe_handle());
        }

        let mut subs = self.subscriptions.write().await;
        if let Some(poller) = subs.get(stream) {
            return Ok(poller.subscribe_handle());
        }

        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        let tx_task = tx.clone();
        let client = Arc::clone(&self.client);
        let stream_owned = stream.to_string();
        let group = group_name(&stream_owned);
        let consumer = consumer_name.to_string();
        let read_interval = self.read_interval;

        let task = tokio::spawn(async move {
            let mut conn = match client.get_multiplexed_async_connection().await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "subscription could not connect; poll loop exiting");
                    return;
                }
            };
            let mut ticker = tokio::time::interval(read_interval);
            loop {
                ticker.tick().await;
                match read_new::<E>(&mut conn, &stream_owned, &group, &consumer).await {
                    Ok(batch) if !batch.is_empty() => {
                        // No receivers yet is not fatal: a later
                        // `subscribe` call attaches via the cache below.
                        let _ = tx_task.send(batch);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, stream = %stream_owned, "subscription poll error"),
                }
            }
        });

        let poller = SharedPoller::spawn(task, tx);
        let handle = poller.subscribe_handle();
        subs.insert(stream.to_string(), poller);
        Ok(handle)
    }

    #[instrument(skip(self), fields(stream = %stream, timestamp = %timestamp), err)]
    async fn ack(&self, stream: &str, timestamp: StreamId) -> DomainResult<u64> {
        let mut conn = self.shared.lock().await;
        let n: u64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group_name(stream))
            .arg(timestamp.to_string())
            .query_async(&mut *conn)
            .await
            .map_err(|e| DomainError::backend(format!("XACK: {e}")))?;
        Ok(n)
    }

    #[instrument(skip(self), fields(stream = %stream, consumer = %consumer_name), err)]
    async fn get_pending(
        &self,
        stream: &str,
        consumer_name: &str,
        max_elapsed: Duration,
    ) -> DomainResult<Vec<LoggedEvent<E>>> {
        let group = group_name(stream);
        let mut conn = self.shared.lock().await;

        let summary: redis::RedisResult<Vec<(String, String, i64, i64)>> = redis::cmd("XPENDING")
            .arg(stream)
            .arg(&group)
            .arg("-")
            .arg("+")
            .arg(READ_COUNT)
            .query_async(&mut *conn)
            .await;

        let ids: Vec<String> = match summary {
            Ok(entries) => entries.into_iter().map(|(id, ..)| id).collect(),
            Err(e) if e.to_string().contains("NOGROUP") => return Ok(vec![]),
            Err(e) => return Err(DomainError::backend(format!("XPENDING: {e}"))),
        };
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let claimed: Vec<(String, Vec<String>)> = redis::cmd("XCLAIM")
            .arg(stream)
            .arg(&group)
            .arg(consumer_name)
            .arg(max_elapsed.as_millis() as u64)
            .arg(&ids)
            .query_async(&mut *conn)
            .await
            .map_err(|e| DomainError::backend(format!("XCLAIM: {e}")))?;

        let mut out = Vec::with_capacity(claimed.len());
        for (entry_id, fields) in claimed {
            out.push(decode_entry(entry_id, fields)?);
        }
        out.sort_by_key(|e| e.timestamp);
        Ok(out)
    }

    async fn close(&self) -> DomainResult<()> {
        let mut subs = self.subscriptions.write().await;
        for (_, poller) in subs.drain() {
            poller.stop();
        }
        Ok(())
    }
}
