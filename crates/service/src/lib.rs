//! Account Service: the command handler. Loads (or rehydrates) an
//! aggregate, validates the command against it, appends the resulting
//! event under optimistic concurrency, and maintains a warm in-process
//! cache of aggregates keyed by account id.

use std::collections::HashMap;
use std::sync::Arc;

use ledger_account::{Account, AccountEvent};
use ledger_core::{AccountId, AggregateRoot, DomainError, DomainResult, StreamId};
use ledger_eventlog::EventLog;
use ledger_events::LoggedEvent;
use tokio::sync::RwLock;
use tracing::instrument;

/// The id namespace `create` registers new account ids into, kept
/// separate from the per-account version-key namespace.
const ID_NAMESPACE: &str = "accountId";

/// Result of a successful `create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAccount {
    pub id: AccountId,
}

/// Result of a successful `deposit`/`withdraw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOperation {
    pub id: AccountId,
    pub amount: u64,
}

/// Read-side projection of an aggregate's current state, returned by
/// `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub version: u64,
    pub timestamp: StreamId,
    pub funds: u64,
}

/// Command handler for the account write side.
///
/// `L` is the event log implementation — `RedisEventLog` in production,
/// `InMemoryEventLog` in tests — so the service's own logic never
/// depends on a concrete backend.
pub struct AccountService<L: EventLog<AccountEvent>> {
    log: Arc<L>,
    stream: String,
    cache: RwLock<HashMap<AccountId, Account>>,
}

impl<L: EventLog<AccountEvent>> AccountService<L> {
    pub fn new(log: Arc<L>, stream: impl Into<String>) -> Self {
        Self {
            log,
            stream: stream.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Reserve `id`, publish its `create` event, and seed the cache with
    /// the resulting aggregate.
    #[instrument(skip(self), fields(id = %id), err)]
    pub async fn create(&self, id: AccountId) -> DomainResult<CreatedAccount> {
        if !self.log.add_id(&id, ID_NAMESPACE).await? {
            return Err(DomainError::conflict("id already exists"));
        }

        match self
            .log
            .publish(&self.stream, AccountEvent::create(id.clone(), 0))
            .await?
        {
            Some((version, timestamp)) => {
                let mut account = Account::new(id.clone());
                account.mark_published(version, timestamp);
                self.cache.write().await.insert(id.clone(), account);
                Ok(CreatedAccount { id })
            }
            // The id registry and the version key disagree only if a
            // `create` for this id was already published without ever
            // completing `add_id` first (shouldn't happen) or under a
            // true race on `add_id` itself — either way, a conflict.
            None => Err(DomainError::conflict("id already exists")),
        }
    }

    /// Add `amount` to `id`'s balance.
    #[instrument(skip(self), fields(id = %id, amount), err)]
    pub async fn deposit(&self, id: AccountId, amount: u64) -> DomainResult<Option<AppliedOperation>> {
        self.mutate(id, amount, Mutation::Deposit).await
    }

    /// Subtract `amount` from `id`'s balance.
    #[instrument(skip(self), fields(id = %id, amount), err)]
    pub async fn withdraw(&self, id: AccountId, amount: u64) -> DomainResult<Option<AppliedOperation>> {
        self.mutate(id, amount, Mutation::Withdraw).await
    }

    async fn mutate(
        &self,
        id: AccountId,
        amount: u64,
        kind: Mutation,
    ) -> DomainResult<Option<AppliedOperation>> {
        let mut account = self.load(id.clone()).await?;
        let proposed_version = account.version();

        match kind {
            Mutation::Deposit => account.deposit(amount)?,
            Mutation::Withdraw => account.withdraw(amount)?,
        }

        let event = match kind {
            Mutation::Deposit => AccountEvent::deposit(id.clone(), proposed_version, amount),
            Mutation::Withdraw => AccountEvent::withdraw(id.clone(), proposed_version, amount),
        };

        match self.log.publish(&self.stream, event).await? {
            Some((version, timestamp)) => {
                account.mark_published(version, timestamp);
                self.cache.write().await.insert(id.clone(), account);
                Ok(Some(AppliedOperation { id, amount }))
            }
            None => {
                // Lost the optimistic-concurrency race. The mutation
                // above is the only one applied since `load`, so
                // reversing it exactly restores the pre-mutation state
                // (§9: "preserve that property — do not batch multiple
                // mutations per publish").
                let reversed = match kind {
                    Mutation::Deposit => account.withdraw(amount),
                    Mutation::Withdraw => account.deposit(amount),
                };
                if let Err(e) = reversed {
                    return Err(DomainError::backend(format!(
                        "compensation failed to reverse {kind:?} of {amount}: {e}"
                    )));
                }
                self.cache.write().await.insert(id, account);
                Ok(None)
            }
        }
    }

    /// Rehydrate-and-snapshot `id`'s current state.
    #[instrument(skip(self), fields(id = %id), err)]
    pub async fn fetch(&self, id: AccountId) -> DomainResult<AccountSnapshot> {
        let account = self.load(id).await?;
        Ok(AccountSnapshot {
            id: account.id().clone(),
            version: account.version(),
            timestamp: account.timestamp(),
            funds: account.funds(),
        })
    }

    /// Load the cached aggregate for `id`, if any, and advance it with
    /// events strictly newer than its last-seen timestamp. Cached
    /// aggregates are therefore only ever read forward, regardless of
    /// how many other processes are publishing against the same id.
    async fn load(&self, id: AccountId) -> DomainResult<Account> {
        let cached = self.cache.read().await.get(&id).cloned();
        let (mut account, was_cached) = match cached {
            Some(account) => (account, true),
            None => (Account::new(id.clone()), false),
        };

        let events: Vec<LoggedEvent<AccountEvent>> =
            self.log.get(&self.stream, &id, account.timestamp()).await?;

        if !was_cached && events.is_empty() {
            return Err(DomainError::NotFound);
        }

        account.rehydrate(events);
        self.cache.write().await.insert(id, account.clone());
        Ok(account)
    }

    /// Shut down the underlying event log.
    pub async fn close(&self) -> DomainResult<()> {
        self.log.close().await
    }
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Deposit,
    Withdraw,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_eventlog::InMemoryEventLog;

    fn service() -> AccountService<InMemoryEventLog<AccountEvent>> {
        AccountService::new(Arc::new(InMemoryEventLog::new()), "accountStream")
    }

    #[tokio::test]
    async fn create_then_fetch_reports_zero_balance() {
        let svc = service();
        let id = AccountId::new("JohnDoe");

        svc.create(id.clone()).await.unwrap();
        let snapshot = svc.fetch(id.clone()).await.unwrap();

        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.funds, 0);
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn duplicate_create_is_a_conflict() {
        let svc = service();
        let id = AccountId::new("JohnDoe");

        svc.create(id.clone()).await.unwrap();
        let err = svc.create(id).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn deposit_then_withdraw_round_trips_balance() {
        let svc = service();
        let id = AccountId::new("JohnDoe");
        svc.create(id.clone()).await.unwrap();

        svc.deposit(id.clone(), 100).await.unwrap().unwrap();
        let after_deposit = svc.fetch(id.clone()).await.unwrap();
        assert_eq!(after_deposit.funds, 100);
        assert_eq!(after_deposit.version, 2);

        svc.withdraw(id.clone(), 100).await.unwrap().unwrap();
        let after_withdraw = svc.fetch(id.clone()).await.unwrap();
        assert_eq!(after_withdraw.funds, 0);
        assert_eq!(after_withdraw.version, 3);
    }

    #[tokio::test]
    async fn withdraw_more_than_balance_fails_without_publishing() {
        let svc = service();
        let id = AccountId::new("JohnDoe");
        svc.create(id.clone()).await.unwrap();

        let err = svc.withdraw(id.clone(), 1).await.unwrap_err();
        assert_eq!(err, DomainError::InsufficientFunds);

        // version must not have advanced past `create`.
        let snapshot = svc.fetch(id).await.unwrap();
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn fetch_unknown_id_is_not_found() {
        let svc = service();
        let err = svc.fetch(AccountId::new("ghost")).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[tokio::test]
    async fn losing_the_optimistic_race_compensates_and_reports_none() {
        let svc = service();
        let id = AccountId::new("JohnDoe");
        svc.create(id.clone()).await.unwrap();

        // Simulate a second writer racing ahead by publishing directly
        // against the log with the version this service's cache still
        // thinks is current.
        svc.log
            .publish(&svc.stream, AccountEvent::deposit(id.clone(), 1, 10))
            .await
            .unwrap();

        let result = svc.deposit(id.clone(), 50).await.unwrap();
        assert!(result.is_none());

        // The compensated in-memory view, once reconciled against the
        // log on the next load, reflects only the winning delta.
        let snapshot = svc.fetch(id).await.unwrap();
        assert_eq!(snapshot.funds, 10);
    }
}
