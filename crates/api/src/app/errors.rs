//! Maps `DomainError` onto the status codes named in §6/§7. Backend
//! failures are logged with full context at the point of origin (see
//! `ledger-eventlog`'s `#[instrument(err)]` spans) and never leak their
//! internals into a response body here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledger_core::DomainError;
use serde_json::json;

fn error_body(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "errorMessage": message.into() }))
}

/// `InvalidAmount`/`InsufficientFunds`/`Conflict` → 400; `Backend` → 500.
/// Used by every route except `GET /accounts/:id`, which distinguishes
/// `NotFound` as 404 (see `not_found_as_404`).
pub fn domain_error_response(err: DomainError) -> Response {
    match err {
        DomainError::InvalidAmount
        | DomainError::InsufficientFunds
        | DomainError::NotFound
        | DomainError::Conflict(_) => {
            (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response()
        }
        DomainError::Backend(_) => {
            tracing::error!(error = %err, "backend failure serving request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal error"),
            )
                .into_response()
        }
    }
}

/// Same mapping as `domain_error_response`, except `NotFound` becomes
/// 404 — used by `GET /accounts/:id` (§6's table lists "404/400" for
/// that route specifically).
pub fn fetch_error_response(err: DomainError) -> Response {
    match err {
        DomainError::NotFound => (StatusCode::NOT_FOUND, error_body(err.to_string())).into_response(),
        other => domain_error_response(other),
    }
}

/// §6: "A `409` is returned whenever the service returns `none`
/// (optimistic-concurrency loss)." Not a `DomainError` at all — the
/// service distinguishes this from a thrown error on purpose (§7).
pub fn conflict_response() -> Response {
    (
        StatusCode::CONFLICT,
        error_body("optimistic concurrency conflict, retry"),
    )
        .into_response()
}
