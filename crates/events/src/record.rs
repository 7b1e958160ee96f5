use ledger_core::StreamId;

use crate::event::Event;

/// An event together with the position the log assigned it.
///
/// This is the shape that flows out of `EventLog::get`/`subscribe`/
/// `get_pending` — the log never hands back a bare payload, only one
/// stamped with the `timestamp` it assigned at append time. `id` and
/// `version` live on the payload itself (they round-trip through the
/// log's serialized `event` field; `timestamp` does not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent<E: Event> {
    pub timestamp: StreamId,
    pub payload: E,
}

impl<E: Event> LoggedEvent<E> {
    pub fn new(timestamp: StreamId, payload: E) -> Self {
        Self { timestamp, payload }
    }

    pub fn account_id(&self) -> &ledger_core::AccountId {
        self.payload.account_id()
    }

    pub fn version(&self) -> u64 {
        self.payload.version()
    }
}
