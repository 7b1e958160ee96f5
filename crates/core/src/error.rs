//! Domain error model.
//!
//! Kept deliberately small and closed (§7 of the spec names exactly these
//! five kinds). Infrastructure failures are folded into `Backend` rather
//! than leaking the event log/view store's own error types this far up —
//! callers above the service boundary only ever match on this enum.

use thiserror::Error;

/// Result type used across the domain and service layers.
pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// `deposit`/`withdraw` called with a non-positive amount.
    #[error("invalid amount")]
    InvalidAmount,

    /// `withdraw` would drive `funds` below zero.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// `_load` rehydrated an uncached id and found zero events.
    #[error("not found")]
    NotFound,

    /// Duplicate `create`, or an optimistic-concurrency loss that the
    /// caller chose to surface rather than retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Event log or view store failure. Logged with full context at the
    /// point of origin; this variant only carries a display string
    /// upward so the HTTP edge doesn't need to know the backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DomainError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
