//! Account Projector: a long-running consumer that drains the account
//! stream via a named consumer group, applies events idempotently to
//! the view store, acknowledges them, and periodically reclaims
//! abandoned pending entries so a crashed or restarted projector loses
//! nothing.

pub mod view_store;

pub use view_store::{memory::InMemoryViewStore, mongo::MongoViewStore, ViewRecord, ViewStore};

use std::sync::Arc;
use std::time::Duration;

use ledger_account::AccountEvent;
use ledger_core::DomainResult;
use ledger_eventlog::EventLog;
use ledger_events::{Event, LoggedEvent};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{instrument, warn};

/// Identifies one projector process/instance within the `accountStream`
/// consumer group: `"accountProjector:" + host + "_" + pid"`, so that
/// restarting the process (new pid) or moving it to another host
/// produces a fresh consumer name rather than colliding with a still-live
/// instance.
fn consumer_name() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("accountProjector:{host}_{}", std::process::id())
}

/// Live background tasks started by `AccountProjector::connect`. Holding
/// on to this and calling `stop` is how a caller shuts the projector
/// down cleanly.
pub struct ProjectorHandle {
    live: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

impl ProjectorHandle {
    fn stop(self) {
        self.live.abort();
        self.sweep.abort();
    }
}

pub struct AccountProjector<L, V> {
    log: Arc<L>,
    view: Arc<V>,
    stream: String,
    consumer_name: String,
    pending_interval: Duration,
}

impl<L, V> AccountProjector<L, V>
where
    L: EventLog<AccountEvent> + 'static,
    V: ViewStore + 'static,
{
    pub fn new(log: Arc<L>, view: Arc<V>, stream: impl Into<String>, pending_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            log,
            view,
            stream: stream.into(),
            consumer_name: consumer_name(),
            pending_interval,
        })
    }

    /// Join the stream's consumer group and start draining it: one task
    /// reads live deliveries, another sweeps the pending list on a
    /// timer. Both feed the same batch handler.
    #[instrument(skip(self), fields(stream = %self.stream, consumer = %self.consumer_name), err)]
    pub async fn connect(self: &Arc<Self>) -> DomainResult<ProjectorHandle> {
        let mut subscription = self.log.subscribe(&self.stream, &self.consumer_name).await?;

        let live_projector = Arc::clone(self);
        let live = tokio::spawn(async move {
            while let Some(batch) = subscription.recv().await {
                live_projector.handle_batch(batch).await;
            }
        });

        let sweep_projector = Arc::clone(self);
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_projector.pending_interval);
            loop {
                ticker.tick().await;
                match sweep_projector
                    .log
                    .get_pending(
                        &sweep_projector.stream,
                        &sweep_projector.consumer_name,
                        sweep_projector.pending_interval,
                    )
                    .await
                {
                    Ok(batch) if !batch.is_empty() => sweep_projector.handle_batch(batch).await,
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "pending sweep failed"),
                }
            }
        });

        Ok(ProjectorHandle { live, sweep })
    }

    /// Stop both background tasks and close the underlying event log.
    pub async fn close(&self, handle: ProjectorHandle) -> DomainResult<()> {
        handle.stop();
        self.log.close().await
    }

    /// Apply every event in a batch concurrently; the batch is done once
    /// all of them have either succeeded or logged their own failure. A
    /// single event's failure never aborts the rest of the batch — it is
    /// simply left unacknowledged and picked up again by the next
    /// pending sweep.
    async fn handle_batch(&self, batch: Vec<LoggedEvent<AccountEvent>>) {
        let mut tasks = JoinSet::new();
        for event in batch {
            let log = Arc::clone(&self.log);
            let view = Arc::clone(&self.view);
            let stream = self.stream.clone();
            tasks.spawn(async move {
                if let Err(e) = apply_and_ack(&*log, &*view, &stream, &event).await {
                    warn!(error = %e, account_id = %event.account_id(), timestamp = %event.timestamp, "failed to project event");
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

async fn apply_and_ack<L, V>(
    log: &L,
    view: &V,
    stream: &str,
    event: &LoggedEvent<AccountEvent>,
) -> DomainResult<()>
where
    L: EventLog<AccountEvent>,
    V: ViewStore,
{
    view.apply_delta(event.account_id(), event.payload.delta(), event.timestamp)
        .await?;
    log.ack(stream, event.timestamp).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_account::AccountEvent;
    use ledger_core::AccountId;
    use ledger_eventlog::InMemoryEventLog;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn projects_deposit_and_withdraw_into_view_store() {
        let log = Arc::new(InMemoryEventLog::<AccountEvent>::with_read_interval(
            StdDuration::from_millis(5),
        ));
        let view = Arc::new(InMemoryViewStore::new());
        let id = AccountId::new("JohnDoe");

        log.publish("accountStream", AccountEvent::create(id.clone(), 0))
            .await
            .unwrap();
        log.publish("accountStream", AccountEvent::deposit(id.clone(), 1, 100))
            .await
            .unwrap();
        log.publish("accountStream", AccountEvent::withdraw(id.clone(), 2, 40))
            .await
            .unwrap();

        let projector = AccountProjector::new(
            Arc::clone(&log),
            Arc::clone(&view),
            "accountStream",
            StdDuration::from_millis(20),
        );
        let handle = projector.connect().await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(100)).await;

        let record = view.get(&id).await.unwrap().expect("record projected");
        assert_eq!(record.funds, 60);
        assert_eq!(record.timestamps.len(), 3);

        projector.close(handle).await.unwrap();
    }

    #[tokio::test]
    async fn redelivering_the_same_event_is_a_no_op() {
        let view = Arc::new(InMemoryViewStore::new());
        let log = Arc::new(InMemoryEventLog::<AccountEvent>::new());
        let id = AccountId::new("JohnDoe");

        let (_, ts) = log
            .publish("accountStream", AccountEvent::create(id.clone(), 0))
            .await
            .unwrap()
            .unwrap();
        let event = LoggedEvent::new(ts, AccountEvent::create(id.clone(), 1));

        let first = view.apply_delta(&id, 0, event.timestamp).await.unwrap();
        let second = view.apply_delta(&id, 0, event.timestamp).await.unwrap();
        assert!(first);
        assert!(!second);

        let record = view.get(&id).await.unwrap().unwrap();
        assert_eq!(record.timestamps.len(), 1);
    }
}
