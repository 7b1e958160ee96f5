use ledger_core::{AccountId, AggregateRoot, DomainError, DomainResult, StreamId};
use ledger_events::LoggedEvent;

use crate::event::{AccountEvent, AccountEventType};

/// Aggregate root: a single account's balance, rebuilt by folding its
/// event stream.
///
/// Unlike a typical decide-then-apply aggregate, `deposit`/`withdraw`
/// mutate `self` immediately (§4.2/§4.3 of the spec): the service applies
/// the mutation in-memory, then attempts to publish it under optimistic
/// concurrency, and — if the publish loses the race — compensates by
/// reversing the very mutation it just applied. Keeping that invariant
/// (exactly one mutation between load and publish) is the caller's job;
/// see `ledger-service`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    version: u64,
    timestamp: StreamId,
    funds: u64,
}

impl Account {
    /// A fresh, never-hydrated instance. `deposit`/`withdraw` are only
    /// meaningful after at least one event (typically `create`) has been
    /// folded in by `rehydrate`.
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            version: 0,
            timestamp: StreamId::EPOCH,
            funds: 0,
        }
    }

    pub fn funds(&self) -> u64 {
        self.funds
    }

    pub fn timestamp(&self) -> StreamId {
        self.timestamp
    }

    /// Increase `funds` by `amount`. Requires `amount > 0`.
    pub fn deposit(&mut self, amount: u64) -> DomainResult<()> {
        if amount == 0 {
            return Err(DomainError::InvalidAmount);
        }
        self.funds += amount;
        Ok(())
    }

    /// Decrease `funds` by `amount`. Requires `amount > 0` and
    /// `funds - amount >= 0`.
    pub fn withdraw(&mut self, amount: u64) -> DomainResult<()> {
        if amount == 0 {
            return Err(DomainError::InvalidAmount);
        }
        if amount > self.funds {
            return Err(DomainError::InsufficientFunds);
        }
        self.funds -= amount;
        Ok(())
    }

    /// Advance `version`/`timestamp` to a server-assigned position
    /// without touching `funds`.
    ///
    /// Used by the command service after a `deposit`/`withdraw` mutation
    /// it already applied in-memory is confirmed published — re-folding
    /// that same event through `rehydrate` would double-apply its delta.
    pub fn mark_published(&mut self, version: u64, timestamp: StreamId) {
        self.version = version;
        self.timestamp = timestamp;
    }

    /// Fold a sequence of log-ordered events into `self`.
    ///
    /// Deterministic given the log's timestamp order. Events for a
    /// different id, or already folded (same `timestamp` as the last one
    /// applied), are skipped — this is what makes rehydrating a warm,
    /// partially-advanced cache safe to repeat.
    pub fn rehydrate<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = LoggedEvent<AccountEvent>>,
    {
        for event in events {
            if event.account_id() != &self.id || event.timestamp == self.timestamp {
                continue;
            }

            self.version = event.version();
            self.timestamp = event.timestamp;

            match event.payload.kind {
                AccountEventType::Deposit => {
                    self.funds += event.payload.amount.unwrap_or(0);
                }
                AccountEventType::Withdraw => {
                    self.funds = self.funds.saturating_sub(event.payload.amount.unwrap_or(0));
                }
                AccountEventType::Create => {}
            }
        }
    }
}

impl AggregateRoot for Account {
    fn id(&self) -> &AccountId {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged(
        id: &AccountId,
        version: u64,
        timestamp: StreamId,
        event: AccountEvent,
    ) -> LoggedEvent<AccountEvent> {
        assert_eq!(event.id, *id);
        assert_eq!(event.version, version);
        LoggedEvent::new(timestamp, event)
    }

    #[test]
    fn deposit_increases_funds() {
        let mut account = Account::new(AccountId::new("acct-1"));
        account.deposit(100).unwrap();
        assert_eq!(account.funds(), 100);
    }

    #[test]
    fn deposit_rejects_zero_amount() {
        let mut account = Account::new(AccountId::new("acct-1"));
        assert_eq!(account.deposit(0).unwrap_err(), DomainError::InvalidAmount);
    }

    #[test]
    fn withdraw_rejects_insufficient_funds() {
        let mut account = Account::new(AccountId::new("acct-1"));
        account.deposit(50).unwrap();
        assert_eq!(
            account.withdraw(51).unwrap_err(),
            DomainError::InsufficientFunds
        );
        // the failed withdraw must not have mutated funds
        assert_eq!(account.funds(), 50);
    }

    #[test]
    fn rehydrate_folds_events_in_order() {
        let id = AccountId::new("acct-1");
        let mut account = Account::new(id.clone());

        let events = vec![
            logged(&id, 1, StreamId::new(1, 0), AccountEvent::create(id.clone(), 1)),
            logged(
                &id,
                2,
                StreamId::new(2, 0),
                AccountEvent::deposit(id.clone(), 2, 100),
            ),
            logged(
                &id,
                3,
                StreamId::new(3, 0),
                AccountEvent::withdraw(id.clone(), 3, 40),
            ),
        ];

        account.rehydrate(events);

        assert_eq!(account.funds(), 60);
        assert_eq!(account.version(), 3);
        assert_eq!(account.timestamp(), StreamId::new(3, 0));
    }

    #[test]
    fn rehydrate_skips_events_for_other_accounts() {
        let id = AccountId::new("acct-1");
        let other = AccountId::new("acct-2");
        let mut account = Account::new(id.clone());

        account.rehydrate(vec![logged(
            &other,
            1,
            StreamId::new(1, 0),
            AccountEvent::deposit(other, 1, 999),
        )]);

        assert_eq!(account.funds(), 0);
        assert_eq!(account.version(), 0);
    }

    #[test]
    fn rehydrate_is_idempotent_for_already_applied_timestamp() {
        let id = AccountId::new("acct-1");
        let mut account = Account::new(id.clone());
        let ts = StreamId::new(1, 0);

        account.rehydrate(vec![logged(
            &id,
            1,
            ts,
            AccountEvent::deposit(id.clone(), 1, 100),
        )]);
        assert_eq!(account.funds(), 100);

        // Re-delivering the same (already-applied) timestamp is a no-op.
        account.rehydrate(vec![logged(
            &id,
            1,
            ts,
            AccountEvent::deposit(id.clone(), 1, 100),
        )]);
        assert_eq!(account.funds(), 100);
        assert_eq!(account.version(), 1);
    }

    proptest::proptest! {
        #![proptest_config(proptest::test_runner::Config {
            cases: 256,
            ..proptest::test_runner::Config::default()
        })]

        /// funds after folding any sequence of well-formed deposit/withdraw
        /// events equals the sum of deposits minus the sum of withdrawals
        /// that were actually applied (withdrawals are clamped at the
        /// aggregate boundary by the service before publish, not here, so
        /// this property holds for any non-negative-result sequence).
        #[test]
        fn funds_equals_sum_of_deltas(
            amounts in proptest::collection::vec(1u64..10_000, 1..20)
        ) {
            let id = AccountId::new("acct-prop");
            let mut account = Account::new(id.clone());
            let mut version = 0u64;
            let mut expected: i64 = 0;
            let mut events = Vec::new();

            events.push(logged(&id, { version += 1; version }, StreamId::new(version, 0), AccountEvent::create(id.clone(), version)));

            for amount in amounts {
                version += 1;
                expected += amount as i64;
                events.push(logged(
                    &id,
                    version,
                    StreamId::new(version, 0),
                    AccountEvent::deposit(id.clone(), version, amount),
                ));
            }

            account.rehydrate(events);
            proptest::prop_assert_eq!(account.funds() as i64, expected);
        }
    }
}
