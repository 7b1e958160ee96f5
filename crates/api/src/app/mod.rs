//! HTTP application wiring (Axum router + state).
//!
//! - `routes.rs`: the four routes of §6.
//! - `dto.rs`: request/response bodies.
//! - `errors.rs`: `DomainError` → status code mapping.

use std::sync::Arc;

use axum::Router;
use ledger_account::AccountEvent;
use ledger_eventlog::EventLog;
use ledger_service::AccountService;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router over a ready `AccountService`. Generic
/// over the event log backend so `main.rs` can wire `RedisEventLog`
/// while tests wire `InMemoryEventLog` against the identical router.
pub fn build_app<L>(service: Arc<AccountService<L>>) -> Router
where
    L: EventLog<AccountEvent> + 'static,
{
    routes::router().with_state(service)
}
