use ledger_core::AccountId;
use ledger_events::Event;
use serde::{Deserialize, Serialize};

/// The three shapes an account event can take.
///
/// `amount` only appears on the wire for `deposit`/`withdraw` — `create`
/// carries none (it is `#[serde(skip_serializing_if = "Option::is_none")]`
/// on `AccountEvent::amount`, not a separate enum variant field here, so
/// the wire shape stays the flat `{id,version,type[,amount]}` object named
/// in the spec rather than an internally-tagged enum with nested payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountEventType {
    Create,
    Deposit,
    Withdraw,
}

/// An event published to the account stream.
///
/// This is exactly the JSON object the log serializes into its single
/// `event` field: `{"id","version","type"[,"amount"]}`. The log assigns
/// the entry's `timestamp` separately at append time — it is never part
/// of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub id: AccountId,
    pub version: u64,
    #[serde(rename = "type")]
    pub kind: AccountEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

impl AccountEvent {
    pub fn create(id: AccountId, version: u64) -> Self {
        Self {
            id,
            version,
            kind: AccountEventType::Create,
            amount: None,
        }
    }

    pub fn deposit(id: AccountId, version: u64, amount: u64) -> Self {
        Self {
            id,
            version,
            kind: AccountEventType::Deposit,
            amount: Some(amount),
        }
    }

    pub fn withdraw(id: AccountId, version: u64, amount: u64) -> Self {
        Self {
            id,
            version,
            kind: AccountEventType::Withdraw,
            amount: Some(amount),
        }
    }
}

impl Event for AccountEvent {
    fn account_id(&self) -> &AccountId {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn event_type(&self) -> &'static str {
        match self.kind {
            AccountEventType::Create => "create",
            AccountEventType::Deposit => "deposit",
            AccountEventType::Withdraw => "withdraw",
        }
    }

    fn delta(&self) -> i64 {
        match self.kind {
            AccountEventType::Create => 0,
            AccountEventType::Deposit => self.amount.unwrap_or(0) as i64,
            AccountEventType::Withdraw => -(self.amount.unwrap_or(0) as i64),
        }
    }

    fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}
