//! The four routes of §6, generic over the event log backend so the
//! same handlers run against `RedisEventLog` in production and
//! `InMemoryEventLog` in the black-box test.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ledger_account::AccountEvent;
use ledger_core::AccountId;
use ledger_eventlog::EventLog;
use ledger_service::AccountService;

use super::dto::{AccountSnapshotResponse, AmountRequest, CreateAccountRequest, CreateAccountResponse, OperationResponse};
use super::errors::{conflict_response, domain_error_response, fetch_error_response};

pub fn router<L>() -> Router<Arc<AccountService<L>>>
where
    L: EventLog<AccountEvent> + 'static,
{
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/:id", get(fetch_account))
        .route("/accounts/:id/deposits", post(deposit))
        .route("/accounts/:id/withdrawals", post(withdraw))
}

async fn create_account<L>(
    State(service): State<Arc<AccountService<L>>>,
    Json(body): Json<CreateAccountRequest>,
) -> Response
where
    L: EventLog<AccountEvent> + 'static,
{
    match service.create(AccountId::new(body.id)).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(CreateAccountResponse {
                id: created.id.into_string(),
            }),
        )
            .into_response(),
        Err(e) => domain_error_response(e),
    }
}

async fn fetch_account<L>(State(service): State<Arc<AccountService<L>>>, Path(id): Path<String>) -> Response
where
    L: EventLog<AccountEvent> + 'static,
{
    match service.fetch(AccountId::new(id)).await {
        Ok(snapshot) => (StatusCode::OK, Json(AccountSnapshotResponse::from(snapshot))).into_response(),
        Err(e) => fetch_error_response(e),
    }
}

async fn deposit<L>(
    State(service): State<Arc<AccountService<L>>>,
    Path(id): Path<String>,
    Json(body): Json<AmountRequest>,
) -> Response
where
    L: EventLog<AccountEvent> + 'static,
{
    apply(&service, id, body, Mutation::Deposit).await
}

async fn withdraw<L>(
    State(service): State<Arc<AccountService<L>>>,
    Path(id): Path<String>,
    Json(body): Json<AmountRequest>,
) -> Response
where
    L: EventLog<AccountEvent> + 'static,
{
    apply(&service, id, body, Mutation::Withdraw).await
}

enum Mutation {
    Deposit,
    Withdraw,
}

/// Shared skeleton for `deposits`/`withdrawals`: both validate the raw
/// request amount the same way, dispatch to the matching
/// `AccountService` method, and map its three-way result
/// (`Ok(Some)`/`Ok(None)`/`Err`) onto 200/409/400 identically.
async fn apply<L>(service: &AccountService<L>, id: String, body: AmountRequest, kind: Mutation) -> Response
where
    L: EventLog<AccountEvent> + 'static,
{
    if body.amount <= 0 {
        return domain_error_response(ledger_core::DomainError::InvalidAmount);
    }
    let amount = body.amount as u64;
    let account_id = AccountId::new(id);

    let result = match kind {
        Mutation::Deposit => service.deposit(account_id, amount).await,
        Mutation::Withdraw => service.withdraw(account_id, amount).await,
    };

    match result {
        Ok(Some(applied)) => (
            StatusCode::OK,
            Json(OperationResponse {
                id: applied.id.into_string(),
                amount: applied.amount,
            }),
        )
            .into_response(),
        Ok(None) => conflict_response(),
        Err(e) => domain_error_response(e),
    }
}
