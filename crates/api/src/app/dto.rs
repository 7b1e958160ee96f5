//! Request/response bodies for the four routes in §6. Plain JSON
//! objects, no envelope — the wire shapes are dictated by the spec's
//! table verbatim.

use ledger_core::StreamId;
use ledger_service::AccountSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub id: String,
    pub amount: u64,
}

#[derive(Debug, Serialize)]
pub struct AccountSnapshotResponse {
    pub id: String,
    pub version: u64,
    pub timestamp: String,
    pub funds: u64,
}

impl From<AccountSnapshot> for AccountSnapshotResponse {
    fn from(snapshot: AccountSnapshot) -> Self {
        Self {
            id: snapshot.id.into_string(),
            version: snapshot.version,
            timestamp: snapshot.timestamp.to_string(),
            funds: snapshot.funds,
        }
    }
}

/// Re-exported so route handlers don't need to know `StreamId` lives in
/// `ledger-core`.
pub type Timestamp = StreamId;
