use ledger_core::AccountId;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A domain event recorded on the account stream (`create`, `deposit`, or
/// `withdraw`).
///
/// This trait exists so the event log client and projector can be written
/// once against an abstract event rather than the concrete enum — even
/// though, today, `AccountEvent` is this trait's only implementor.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static + Serialize + DeserializeOwned {
    /// The account this event applies to.
    fn account_id(&self) -> &AccountId;

    /// Aggregate version *after* this event is applied (assigned by
    /// `EventLog::publish`, carried in the event's own serialized form).
    fn version(&self) -> u64;

    /// Stable wire name for the event's `type` field (`"create"`,
    /// `"deposit"`, `"withdraw"`).
    fn event_type(&self) -> &'static str;

    /// Signed balance delta this event contributes when projected:
    /// `create` → `0`, `deposit` → `+amount`, `withdraw` → `-amount`.
    fn delta(&self) -> i64;

    /// Returns `self` with `version` overwritten.
    ///
    /// The event log calls this once it has resolved the optimistic
    /// concurrency check: the caller proposes the *expected* version, the
    /// log stamps the *assigned* one before storing and returning it.
    fn with_version(self, version: u64) -> Self
    where
        Self: Sized;
}
